//! Operator Console
//!
//! Line commands typed on the terminal of a running server. Every command
//! goes through the server's own [`Operator`], so opening, closing and roster
//! changes apply to the live election instead of a copy on disk.

use std::sync::Arc;

use crate::admin::{self, Operator};
use crate::credentials::Role;
use crate::election::{CandidateId, VoterId};
use crate::error::{Error, Result};

pub const HELP: &str = "\
Commands:
  login <admin> <password>
  open | close
  voter add <id> <name> <login> <password> | voter list
  candidate add <id> <name> | candidate list
  results | stats | export
  account add <login> <password> [role]
  account passwd <login> <old> <new> | account reset <login> <new>
  account enable <login> | account disable <login> | account list
  logout | help | quit
";

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Login { login: String, password: String },
    Logout,
    Open,
    Close,
    VoterAdd { id: VoterId, name: String, login: String, password: String },
    VoterList,
    CandidateAdd { id: CandidateId, name: String },
    CandidateList,
    Results,
    Stats,
    Export,
    AccountAdd { login: String, password: String, role: Role },
    AccountPasswd { login: String, old: String, new: String },
    AccountReset { login: String, new: String },
    AccountEnable { login: String },
    AccountDisable { login: String },
    AccountList,
    Help,
    Quit,
}

impl ConsoleCommand {
    fn needs_admin(&self) -> bool {
        !matches!(
            self,
            ConsoleCommand::Login { .. } | ConsoleCommand::Help | ConsoleCommand::Quit
        )
    }
}

fn parse_id(word: &str) -> Result<i64> {
    word.parse()
        .map_err(|_| Error::Invalid(format!("{:?} is not a numeric id", word)))
}

/// Parse one non-empty console line
pub fn parse(line: &str) -> Result<ConsoleCommand> {
    let words: Vec<&str> = line.split_whitespace().collect();

    let command = match words.as_slice() {
        ["login", login, password] => ConsoleCommand::Login {
            login: login.to_string(),
            password: password.to_string(),
        },
        ["logout"] => ConsoleCommand::Logout,
        ["open"] => ConsoleCommand::Open,
        ["close"] => ConsoleCommand::Close,
        ["voter", "add", id, name, login, password] => ConsoleCommand::VoterAdd {
            id: parse_id(id)?,
            name: name.to_string(),
            login: login.to_string(),
            password: password.to_string(),
        },
        ["voter", "list"] => ConsoleCommand::VoterList,
        ["candidate", "add", id, name] => ConsoleCommand::CandidateAdd {
            id: parse_id(id)?,
            name: name.to_string(),
        },
        ["candidate", "list"] => ConsoleCommand::CandidateList,
        ["results"] => ConsoleCommand::Results,
        ["stats"] => ConsoleCommand::Stats,
        ["export"] => ConsoleCommand::Export,
        ["account", "add", login, password] => ConsoleCommand::AccountAdd {
            login: login.to_string(),
            password: password.to_string(),
            role: Role::Voter,
        },
        ["account", "add", login, password, role] => ConsoleCommand::AccountAdd {
            login: login.to_string(),
            password: password.to_string(),
            role: Role::from(*role),
        },
        ["account", "passwd", login, old, new] => ConsoleCommand::AccountPasswd {
            login: login.to_string(),
            old: old.to_string(),
            new: new.to_string(),
        },
        ["account", "reset", login, new] => ConsoleCommand::AccountReset {
            login: login.to_string(),
            new: new.to_string(),
        },
        ["account", "enable", login] => ConsoleCommand::AccountEnable { login: login.to_string() },
        ["account", "disable", login] => ConsoleCommand::AccountDisable { login: login.to_string() },
        ["account", "list"] => ConsoleCommand::AccountList,
        ["help"] | ["?"] => ConsoleCommand::Help,
        ["quit"] | ["exit"] => ConsoleCommand::Quit,
        [] => return Err(Error::Invalid("empty command".into())),
        _ => return Err(Error::Invalid(format!("unknown command {:?}; try help", line.trim()))),
    };
    Ok(command)
}

/// What the caller should do after a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleReply {
    Output(String),
    Quit,
}

/// Console session bound to a running server's operator
pub struct Console {
    operator: Arc<Operator>,
    /// Authenticated administrator, if any
    admin: Option<String>,
}

impl Console {
    pub fn new(operator: Arc<Operator>) -> Self {
        Self {
            operator,
            admin: None,
        }
    }

    pub fn admin(&self) -> Option<&str> {
        self.admin.as_deref()
    }

    /// Run one typed line; errors are rendered, never returned
    pub async fn handle_line(&mut self, line: &str) -> ConsoleReply {
        if line.trim().is_empty() {
            return ConsoleReply::Output(String::new());
        }

        let command = match parse(line) {
            Ok(command) => command,
            Err(e) => return ConsoleReply::Output(format!("error: {}\n", e)),
        };

        if command == ConsoleCommand::Quit {
            return ConsoleReply::Quit;
        }

        match self.execute(command).await {
            Ok(output) => ConsoleReply::Output(output),
            Err(e) => ConsoleReply::Output(format!("error: {}\n", e)),
        }
    }

    async fn execute(&mut self, command: ConsoleCommand) -> Result<String> {
        if command.needs_admin() && self.admin.is_none() {
            return Err(Error::Invalid("log in first: login <admin> <password>".into()));
        }

        let op = &self.operator;
        let election = op.election();

        let output = match command {
            ConsoleCommand::Login { login, password } => {
                op.require_admin(&login, &password).await?;
                tracing::info!("Console login by {}", login);
                let output = format!("✓ Logged in as {}\n", login);
                self.admin = Some(login);
                output
            }
            ConsoleCommand::Logout => {
                self.admin = None;
                "✓ Logged out\n".to_string()
            }
            ConsoleCommand::Open => {
                op.open().await?;
                "✓ Voting is open\n".to_string()
            }
            ConsoleCommand::Close => {
                op.close().await?;
                "✓ Voting is closed\n".to_string()
            }
            ConsoleCommand::VoterAdd {
                id,
                name,
                login,
                password,
            } => {
                op.add_voter(id, &name, &login, &password).await?;
                format!("✓ Voter {} ({}) registered\n", id, name)
            }
            ConsoleCommand::VoterList => admin::render_voters(&election.voters().await),
            ConsoleCommand::CandidateAdd { id, name } => {
                op.add_candidate(id, &name).await?;
                format!("✓ Candidate {} ({}) registered\n", id, name)
            }
            ConsoleCommand::CandidateList => admin::render_candidates(&election.candidates().await),
            ConsoleCommand::Results => admin::render_results(&election.tally().await),
            ConsoleCommand::Stats => {
                admin::render_stats(&election.turnout().await, election.is_open().await)
            }
            ConsoleCommand::Export => {
                let path = op.export().await?;
                format!("✓ Results written to {}\n", path.display())
            }
            ConsoleCommand::AccountAdd {
                login,
                password,
                role,
            } => {
                op.add_account(&login, &password, role).await?;
                format!("✓ Account {} created\n", login)
            }
            ConsoleCommand::AccountPasswd { login, old, new } => {
                op.change_password(&login, Some(&old), &new).await?;
                format!("✓ Password changed for {}\n", login)
            }
            ConsoleCommand::AccountReset { login, new } => {
                op.change_password(&login, None, &new).await?;
                format!("✓ Password reset for {}\n", login)
            }
            ConsoleCommand::AccountEnable { login } => {
                op.set_active(&login, true).await?;
                format!("✓ Account {} enabled\n", login)
            }
            ConsoleCommand::AccountDisable { login } => {
                op.set_active(&login, false).await?;
                format!("✓ Account {} disabled\n", login)
            }
            ConsoleCommand::AccountList => admin::render_accounts(&op.store().list().await?),
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Quit => String::new(),
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialStore;
    use crate::election::{snapshot, Election};
    use crate::persist::FileSink;
    use tempfile::{tempdir, TempDir};

    async fn console_in(dir: &TempDir) -> Console {
        let store = Arc::new(CredentialStore::new(dir.path().join("users.csv")));
        store.init().await.unwrap();
        let sink = Arc::new(FileSink::new(
            dir.path().join("vote_data.txt"),
            dir.path().join("results.csv"),
        ));
        let op = Operator::new(store, Arc::new(Election::new()), sink);
        op.bootstrap("root", "toor").await.unwrap();
        Console::new(Arc::new(op))
    }

    fn output(reply: ConsoleReply) -> String {
        match reply {
            ConsoleReply::Output(text) => text,
            ConsoleReply::Quit => panic!("unexpected quit"),
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("open").unwrap(), ConsoleCommand::Open);
        assert_eq!(parse("  voter   list ").unwrap(), ConsoleCommand::VoterList);
        assert_eq!(
            parse("voter add 3 Carl carl pw").unwrap(),
            ConsoleCommand::VoterAdd {
                id: 3,
                name: "Carl".into(),
                login: "carl".into(),
                password: "pw".into(),
            }
        );
        assert_eq!(
            parse("account add obs pw observer").unwrap(),
            ConsoleCommand::AccountAdd {
                login: "obs".into(),
                password: "pw".into(),
                role: Role::from("observer"),
            }
        );
        assert_eq!(
            parse("account add bob pw").unwrap(),
            ConsoleCommand::AccountAdd {
                login: "bob".into(),
                password: "pw".into(),
                role: Role::Voter,
            }
        );
        assert_eq!(parse("exit").unwrap(), ConsoleCommand::Quit);
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        for line in ["", "vote 1 5", "voter add x Carl carl pw", "candidate add 5", "open now"] {
            assert!(matches!(parse(line), Err(Error::Invalid(_))), "line {:?}", line);
        }
    }

    #[tokio::test]
    async fn test_commands_require_login() {
        let dir = tempdir().unwrap();
        let mut console = console_in(&dir).await;

        let reply = output(console.handle_line("close").await);
        assert!(reply.starts_with("error:"));

        assert!(output(console.handle_line("help").await).contains("voter add"));

        let reply = output(console.handle_line("login root wrong").await);
        assert!(reply.starts_with("error:"));
        assert_eq!(console.admin(), None);

        output(console.handle_line("login root toor").await);
        assert_eq!(console.admin(), Some("root"));

        output(console.handle_line("logout").await);
        assert!(output(console.handle_line("stats").await).starts_with("error:"));
    }

    #[tokio::test]
    async fn test_voter_cannot_log_in() {
        let dir = tempdir().unwrap();
        let mut console = console_in(&dir).await;
        console.operator.add_account("alice", "pw", Role::Voter).await.unwrap();

        let reply = output(console.handle_line("login alice pw").await);
        assert!(reply.contains("not an administrator"));
        assert_eq!(console.admin(), None);
    }

    #[tokio::test]
    async fn test_console_changes_the_shared_election() {
        let dir = tempdir().unwrap();
        let mut console = console_in(&dir).await;
        let election = Arc::clone(console.operator.election());

        output(console.handle_line("login root toor").await);
        output(console.handle_line("candidate add 5 Bob").await);
        output(console.handle_line("voter add 1 Alice alice secret").await);
        output(console.handle_line("open").await);

        assert!(election.is_open().await);
        election.cast_vote(1, "alice", 5).await.unwrap();

        let results = output(console.handle_line("results").await);
        assert!(results.contains("Bob"));

        output(console.handle_line("close").await);
        assert!(!election.is_open().await);

        let saved = snapshot::load(&dir.path().join("vote_data.txt")).await.unwrap();
        assert!(!saved.is_open);
        assert!(saved.voters[0].has_voted);
    }

    #[tokio::test]
    async fn test_errors_are_rendered() {
        let dir = tempdir().unwrap();
        let mut console = console_in(&dir).await;
        output(console.handle_line("login root toor").await);

        assert!(output(console.handle_line("candidate add 0 Nobody").await).starts_with("error:"));
        assert!(output(console.handle_line("account enable ghost").await).starts_with("error:"));
        assert!(output(console.handle_line("frobnicate").await).contains("try help"));
        assert_eq!(output(console.handle_line("   ").await), "");
        assert_eq!(console.handle_line("quit").await, ConsoleReply::Quit);
    }
}
