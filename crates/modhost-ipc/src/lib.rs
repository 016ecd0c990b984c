//! Child-process IPC bridge (C3): spawns foreign-language module processes,
//! speaks the length-delimited JSON protocol over their stdio, and
//! correlates concurrent requests by id.

pub mod child;
pub mod key;
pub mod manager;
pub mod wire;

pub use child::{ChildHandle, SpawnSpec};
pub use key::ChildKey;
pub use manager::IpcManager;
pub use wire::{is_ready_frame, ReadyFrame, RequestFrame, ResponseFrame};
