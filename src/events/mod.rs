//! Session events and the bus that carries them.
//!
//! Every observable step of a session (launch, adoption, signal, drain) is an
//! [`Event`] published on the session's [`Bus`]. The supervisor's listener is
//! the only consumer; it hands each event to the
//! [`SubscriberSet`](crate::SubscriberSet).
//!
//! | Publisher         | Kinds                                                        |
//! |-------------------|--------------------------------------------------------------|
//! | `Supervisor`      | subreaper state, `MainStarted`, `SessionDone`                |
//! | `Reaper`          | `MainExited`, `ChildAdopted`, `ReapFailed`                   |
//! | `SignalForwarder` | `SignalReceived`, `SignalForwarded`                          |
//! | `Coordinator`     | timeout, kill, drain and `AllReaped` / `DrainIncomplete`     |

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
