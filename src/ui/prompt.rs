// Interactive questions asked before the disk is touched

use std::io::{self, BufRead, Write};

use crate::core::config::{is_valid_username, InstallAnswers, UserAccount};
use crate::core::disk::DiskInfo;
use crate::error::{InstallError, IoContext, Result};
use crate::ui::colors::{StyledText, Theme};
use crate::ui::terminal;

const ATTEMPTS: usize = 3;

/// Source of operator answers
pub trait Prompter {
    /// Asks a question and returns the trimmed answer
    fn ask(&mut self, question: &str) -> Result<String>;

    /// Asks for a secret without echoing it
    fn ask_secret(&mut self, question: &str) -> Result<String>;
}

/// Prompts on the controlling terminal
pub struct TerminalPrompter {
    theme: Theme,
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self { theme: Theme::default() }
    }
}

impl TerminalPrompter {
    fn show(&self, question: &str) -> Result<()> {
        let mut stdout = io::stdout();
        write!(stdout, "{} ", StyledText::bold(question, self.theme.accent)).context("Writing prompt")?;
        stdout.flush().context("Writing prompt")
    }
}

impl Prompter for TerminalPrompter {
    fn ask(&mut self, question: &str) -> Result<String> {
        self.show(question)?;
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line).context("Reading answer")?;
        if read == 0 {
            return Err(InstallError::Cancelled);
        }
        Ok(line.trim().to_string())
    }

    fn ask_secret(&mut self, question: &str) -> Result<String> {
        self.show(question)?;
        terminal::read_hidden_line()
            .context("Reading password")?
            .ok_or(InstallError::Cancelled)
    }
}

/// Shows the available disks and asks which one to wipe
pub fn ask_disk(prompter: &mut dyn Prompter, disks: &[DiskInfo]) -> Result<String> {
    if disks.is_empty() {
        return Err(InstallError::InvalidDisk("no disks found".to_string()));
    }

    let listing: Vec<String> = disks.iter().map(|d| format!("  {}  ({})", d.path, d.size)).collect();
    let question = format!("Available disks:\n{}\nDisk to install to:", listing.join("\n"));

    for _ in 0..ATTEMPTS {
        let answer = prompter.ask(&question)?;
        if disks.iter().any(|d| d.path == answer) {
            let confirm = prompter.ask(&format!("ALL DATA ON {} WILL BE ERASED. Type 'yes' to continue:", answer))?;
            if confirm != "yes" {
                return Err(InstallError::Cancelled);
            }
            return Ok(answer);
        }
        log::warn!("{} is not one of the listed disks", answer);
    }
    Err(InstallError::InvalidInput("no valid disk selected".to_string()))
}

/// Asks for a non-empty password twice
pub fn ask_password(prompter: &mut dyn Prompter, account: &str) -> Result<String> {
    for _ in 0..ATTEMPTS {
        let password = prompter.ask_secret(&format!("Password for {}:", account))?;
        if password.is_empty() {
            log::warn!("Password must not be empty");
            continue;
        }
        let again = prompter.ask_secret(&format!("Repeat password for {}:", account))?;
        if password == again {
            return Ok(password);
        }
        log::warn!("Passwords do not match");
    }
    Err(InstallError::InvalidInput(format!("no password set for {}", account)))
}

pub fn ask_username(prompter: &mut dyn Prompter) -> Result<String> {
    for _ in 0..ATTEMPTS {
        let name = prompter.ask("Username:")?;
        if is_valid_username(&name) {
            return Ok(name);
        }
        log::warn!("{:?} is not a valid user name", name);
    }
    Err(InstallError::InvalidInput("no valid user name given".to_string()))
}

/// Collects disk, root password, username and user password, in that order
pub fn ask_answers(prompter: &mut dyn Prompter, disks: &[DiskInfo]) -> Result<InstallAnswers> {
    let disk = ask_disk(prompter, disks)?;
    let root_password = ask_password(prompter, "root")?;
    let name = ask_username(prompter)?;
    let password = ask_password(prompter, &name)?;
    Ok(InstallAnswers {
        disk,
        root_password,
        user: UserAccount { name, password },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<&'static str>);

    impl Prompter for Scripted {
        fn ask(&mut self, _question: &str) -> Result<String> {
            self.0.pop_front().map(String::from).ok_or(InstallError::Cancelled)
        }

        fn ask_secret(&mut self, question: &str) -> Result<String> {
            self.ask(question)
        }
    }

    fn disks() -> Vec<DiskInfo> {
        vec![DiskInfo { path: "/dev/sda".into(), size: "100G".into() }]
    }

    #[test]
    fn collects_all_answers() {
        let mut prompter = Scripted(VecDeque::from(vec!["/dev/sda", "yes", "rootpw", "rootpw", "alice", "pw", "pw"]));
        let answers = ask_answers(&mut prompter, &disks()).unwrap();
        assert_eq!(answers.disk, "/dev/sda");
        assert_eq!(answers.root_password, "rootpw");
        assert_eq!(answers.user.name, "alice");
        assert_eq!(answers.user.password, "pw");
    }

    #[test]
    fn declining_the_wipe_cancels() {
        let mut prompter = Scripted(VecDeque::from(vec!["/dev/sda", "no"]));
        assert!(matches!(ask_disk(&mut prompter, &disks()), Err(InstallError::Cancelled)));
    }

    #[test]
    fn unknown_disk_is_asked_again() {
        let mut prompter = Scripted(VecDeque::from(vec!["/dev/sdb", "/dev/sda", "yes"]));
        assert_eq!(ask_disk(&mut prompter, &disks()).unwrap(), "/dev/sda");
    }

    #[test]
    fn mismatched_passwords_are_retried() {
        let mut prompter = Scripted(VecDeque::from(vec!["a", "b", "", "c", "c"]));
        assert_eq!(ask_password(&mut prompter, "root").unwrap(), "c");
    }

    #[test]
    fn gives_up_after_three_bad_usernames() {
        let mut prompter = Scripted(VecDeque::from(vec!["Root", "1x", "a b"]));
        assert!(matches!(ask_username(&mut prompter), Err(InstallError::InvalidInput(_))));
    }
}
