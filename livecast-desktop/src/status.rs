//! Terminal status display.

use livecast_collab::{ConnectionPhase, Notice, NoticeLevel, StatusObserver};

/// Indicator shown next to the phase name.
pub fn indicator(phase: ConnectionPhase) -> &'static str {
    match phase {
        ConnectionPhase::Connected => "✔",
        ConnectionPhase::Connecting | ConnectionPhase::SignedIn | ConnectionPhase::Reconnecting => "⟳",
        ConnectionPhase::Disconnected => "■",
    }
}

pub fn status_line(phase: ConnectionPhase) -> String {
    format!("{} Livecast: {phase}", indicator(phase))
}

/// Prints phase changes and notices to the terminal.
pub struct TerminalStatus;

impl StatusObserver for TerminalStatus {
    fn phase_changed(&mut self, _old: ConnectionPhase, new: ConnectionPhase) {
        println!("{}", status_line(new));
    }

    fn notify(&mut self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => println!("{}", notice.message),
            NoticeLevel::Warning => eprintln!("warning: {}", notice.message),
            NoticeLevel::Error => eprintln!("error: {}", notice.message),
        }
    }
}
