//! Protocol types shared between the filter manager and its callers.

use crate::display::DisplaySnapshot;
use crate::filter::{Direction, FilterId, FilterMode};
use crate::spinner::SpinnerState;
use chrono::NaiveDateTime;
use tokio::sync::mpsc::UnboundedSender;

/// What kind of filter to append before the output cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSpec {
    Keyword {
        key: String,
        mode: FilterMode,
        case_sensitive: bool,
        color_index: u8,
    },
    DateRange {
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    },
}

/// Requests processed in order by the manager's event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ScrollUp,
    ScrollDown,
    /// Positive moves right
    ScrollHorizontal(isize),
    PageUp,
    PageDown,
    Home,
    End,
    FindMatch(Direction),
    AddFilter {
        id: FilterId,
        spec: FilterSpec,
    },
    RemoveFilter(FilterId),
    SetDisplayHeight(usize),
    SetCurrentLine(usize),
    SetFilterKey {
        id: FilterId,
        key: String,
    },
    SetFilterMode {
        id: FilterId,
        mode: FilterMode,
    },
    SetCaseSensitive {
        id: FilterId,
        case_sensitive: bool,
    },
    SetFilterColor {
        id: FilterId,
        color_index: u8,
    },
    SetDateRange {
        id: FilterId,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    },
    ToggleFollowMode,
}

/// Events pushed to whoever renders the viewer
#[derive(Debug, Clone)]
pub enum Notification {
    /// The viewport contents or position changed
    DisplayChanged(DisplaySnapshot),
    /// The source grew
    FileChanged {
        total_length: usize,
        percentage: u8,
    },
    /// A command could not be carried out
    Error { beep: bool, message: String },
    /// Busy indicator transition
    Progress(SpinnerState),
    /// The initial load finished
    EndOfInput,
}

/// Fire-and-forget sender for [`Notification`]s.
///
/// A closed receiver only means nobody is rendering any more; the manager
/// keeps running until it is shut down.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: UnboundedSender<Notification>,
}

impl Notifier {
    pub fn new(tx: UnboundedSender<Notification>) -> Self {
        Self { tx }
    }

    pub fn send(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            log::trace!("notification dropped, receiver closed");
        }
    }

    pub fn display_changed(&self, snapshot: DisplaySnapshot) {
        self.send(Notification::DisplayChanged(snapshot));
    }

    pub fn beep(&self, message: impl Into<String>) {
        self.send(Notification::Error {
            beep: true,
            message: message.into(),
        });
    }
}
