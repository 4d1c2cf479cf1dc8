use colored::Colorize;
use supports_color::Stream;

/// Enables colored console output only when stdout can render it.
pub fn configure_colors() {
    let supported = supports_color::on(Stream::Stdout).is_some();
    colored::control::set_override(supported);
}

pub fn step(message: impl AsRef<str>) {
    println!("{} {}", "→".cyan().bold(), message.as_ref());
}

pub fn notice(message: impl AsRef<str>) {
    println!("{}", message.as_ref().yellow());
}

/// File counts printed after the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals<'a> {
    pub old_tag: &'a str,
    pub new_tag: &'a str,
    pub old_files: usize,
    pub new_files: usize,
    pub changed: usize,
    pub removed: usize,
}

impl Totals<'_> {
    pub fn lines(&self) -> [String; 4] {
        [
            format!(" - Files in ({}): {}", self.old_tag, self.old_files),
            format!(" - Files in ({}): {}", self.new_tag, self.new_files),
            format!(" - Files added / modified: {}", self.changed),
            format!(" - Files removed: {}", self.removed),
        ]
    }

    pub fn print(&self) {
        for line in self.lines() {
            println!("{}", line.bold());
        }
        println!();
    }
}
