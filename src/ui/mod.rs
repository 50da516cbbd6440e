// Console output for the Exliar installer
//
// Progress goes through the `log` macros; this module adds the colored
// section banners, the final status line and the interactive prompts.

pub mod colors;
pub mod prompt;
pub mod terminal;

use colors::{StyledText, Theme};

/// Prints a section banner such as "==> Partitioning"
pub fn banner(title: &str) {
    let theme = Theme::default();
    println!(
        "\n{} {}",
        StyledText::bold("==>", theme.primary),
        StyledText::bold(title, theme.accent)
    );
}

pub fn success(message: &str) {
    println!("{}", StyledText::bold(message, Theme::default().success));
}

/// Fatal error line, printed on stderr
pub fn failure(message: &str) {
    eprintln!(
        "{} {}",
        StyledText::bold("ERROR:", Theme::default().error),
        StyledText::new(message, Theme::default().error)
    );
}

/// Dimmed informational line, printed on stderr
pub fn note(message: &str) {
    eprintln!("{}", StyledText::new(message, Theme::default().muted));
}
