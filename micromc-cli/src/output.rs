//! One-line status output of the launcher, with an optional verbose level and an
//! in-place download progress line on terminals.

use std::io::{IsTerminal, Write};
use std::fmt::Display;


#[derive(Debug)]
pub struct Output {
    verbose: bool,
    /// True while a progress line is displayed and not yet terminated by a newline.
    progress_active: bool,
    /// True when stdout is a terminal, enabling in-place progress rendering.
    term: bool,
}

impl Output {

    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            progress_active: false,
            term: std::io::stdout().is_terminal(),
        }
    }

    /// Terminate a pending progress line before writing a regular line.
    fn end_progress(&mut self) {
        if self.progress_active {
            println!();
            self.progress_active = false;
        }
    }

    /// One-line status of a phase, always shown.
    pub fn phase(&mut self, message: impl Display) {
        self.end_progress();
        println!("{message}");
    }

    /// Details only shown in verbose mode.
    pub fn info(&mut self, message: impl Display) {
        if self.verbose {
            self.end_progress();
            println!("{message}");
        }
    }

    pub fn warning(&mut self, message: impl Display) {
        self.end_progress();
        eprintln!("warning: {message}");
    }

    pub fn error(&mut self, message: impl Display) {
        self.end_progress();
        eprintln!("error: {message}");
    }

    /// Download progress, rendered in place on terminals and only at completion
    /// otherwise.
    pub fn progress(&mut self, count: u32, total_count: u32) {

        if self.term {
            print!("\rDownloading... {count}/{total_count}");
            let _ = std::io::stdout().flush();
            self.progress_active = true;
            if count == total_count {
                self.end_progress();
            }
        } else if count == total_count {
            println!("Downloaded {total_count} files");
        }

    }

}
