//! Tally Export
//!
//! Semicolon-separated results file meant for spreadsheets.

use std::fmt::Write as _;
use std::path::Path;

use super::state::{Tally, ABSTAIN_ID};
use crate::error::Result;
use crate::persist::replace_file;

/// Header row of the export
pub const HEADER: &str = "candidate_id;candidate_name;votes";

/// Label of the abstention row
pub const ABSTAIN_LABEL: &str = "ABSTAIN";

/// Render the export text
pub fn render(tally: &Tally) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", HEADER);
    for entry in &tally.entries {
        let _ = writeln!(out, "{};{};{}", entry.id, entry.name, entry.votes);
    }
    let _ = writeln!(out, "{};{};{}", ABSTAIN_ID, ABSTAIN_LABEL, tally.blank);
    out
}

/// Write the export to `path`
pub async fn write(path: &Path, tally: &Tally) -> Result<()> {
    replace_file(path, render(tally)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::election::TallyEntry;

    #[test]
    fn test_render() {
        let tally = Tally {
            entries: vec![
                TallyEntry { id: 5, name: "Bob".into(), votes: 3 },
                TallyEntry { id: 7, name: "Chloe".into(), votes: 1 },
            ],
            blank: 2,
        };

        assert_eq!(
            render(&tally),
            "candidate_id;candidate_name;votes\n5;Bob;3\n7;Chloe;1\n0;ABSTAIN;2\n"
        );
    }

    #[test]
    fn test_render_empty_roster() {
        let tally = Tally { entries: vec![], blank: 0 };
        assert_eq!(render(&tally), "candidate_id;candidate_name;votes\n0;ABSTAIN;0\n");
    }
}
