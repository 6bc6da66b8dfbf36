//! Room-level coordination
//!
//! The [`Coordinator`] runs the event loop for one room, the
//! [`Dispatcher`] routes signaling messages to peer sessions and the
//! [`RoomObserver`] receives stream lifecycle notifications.

pub mod coordinator;
pub mod dispatcher;
pub mod event;
pub mod observer;

pub use coordinator::{Coordinator, CoordinatorHandle};
pub use dispatcher::Dispatcher;
pub use event::{Command, CoordinatorEvent};
pub use observer::RoomObserver;
