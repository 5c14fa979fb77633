//! Live results display
//!
//! Periodically redraws the tally and turnout on the operator terminal.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::election::{export::ABSTAIN_LABEL, Election, Tally, Turnout};

/// Render one frame of the results screen
pub fn render(tally: &Tally, turnout: &Turnout, is_open: bool) -> String {
    let mut out = String::new();

    let status = if is_open {
        "\x1b[1;32mOPEN\x1b[0m"
    } else {
        "\x1b[1;31mCLOSED\x1b[0m"
    };

    let _ = writeln!(out);
    let _ = writeln!(out, "  \x1b[1;36mBallotBox Live Results\x1b[0m  [{}]", status);
    let _ = writeln!(out, "  {}", "=".repeat(50));
    let _ = writeln!(out);

    for entry in &tally.entries {
        let _ = writeln!(out, "  [{:>3}] {:30} {:>8}", entry.id, entry.name, entry.votes);
    }
    let _ = writeln!(out, "  [{:>3}] {:30} {:>8}", 0, ABSTAIN_LABEL, tally.blank);
    let _ = writeln!(out);

    let percent = if turnout.total > 0 {
        turnout.voted as f64 * 100.0 / turnout.total as f64
    } else {
        0.0
    };
    let _ = writeln!(out, "  \x1b[1mTurnout\x1b[0m");
    let _ = writeln!(out, "  {}", "-".repeat(50));
    let _ = writeln!(
        out,
        "  Voted:    {:>6} / {:<6} ({:.1}%)",
        turnout.voted, turnout.total, percent
    );
    let _ = writeln!(out, "  Blank:    {:>6}", turnout.blank);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "  Updated {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    out
}

/// Redraw every `interval` until `shutdown` flips to true
pub async fn run_display(
    election: Arc<Election>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let tally = election.tally().await;
                let turnout = election.turnout().await;
                let is_open = election.is_open().await;

                // Clear screen and move cursor to top
                print!("\x1b[H\x1b[J{}", render(&tally, &turnout, is_open));
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::debug!("Display stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::election::TallyEntry;

    #[test]
    fn test_render_lists_candidates_and_blank() {
        let tally = Tally {
            entries: vec![TallyEntry {
                id: 5,
                name: "Bob".into(),
                votes: 3,
            }],
            blank: 1,
        };
        let turnout = Turnout {
            voted: 4,
            total: 8,
            blank: 1,
        };

        let frame = render(&tally, &turnout, true);
        assert!(frame.contains("Bob"));
        assert!(frame.contains(ABSTAIN_LABEL));
        assert!(frame.contains("(50.0%)"));
        assert!(frame.contains("OPEN"));
    }

    #[test]
    fn test_render_empty_election() {
        let tally = Tally {
            entries: vec![],
            blank: 0,
        };
        let turnout = Turnout {
            voted: 0,
            total: 0,
            blank: 0,
        };
        assert!(render(&tally, &turnout, false).contains("(0.0%)"));
    }

    #[tokio::test]
    async fn test_display_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run_display(
            Arc::new(Election::new()),
            Duration::from_millis(10),
            rx,
        ));

        tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
