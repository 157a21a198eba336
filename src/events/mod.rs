//! # Events Module
//!
//! Progress reporting decoupled from presentation.
//!
//! The pipeline emits events through a channel; the CLI (or any other
//! front end) subscribes and renders them however it likes.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::Move(MoveEvent::Placed { to, .. }) = event {
//!             println!("placed {}", to.display());
//!         }
//!     }
//! });
//!
//! pipeline.run_with_events(&sender)?;
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
