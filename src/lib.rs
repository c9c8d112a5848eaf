#![doc = include_str!("../README.md")]

pub mod addr;
pub mod conn;
pub mod frame;
pub mod io;

mod context;
mod error;
mod socket;

#[cfg_attr(target_family = "windows", path = "sys_win32.rs")]
pub mod sys;

pub use conn::ConnectTimeout;
pub use context::NetContext;
pub use error::{Error, Result};
pub use frame::{FrameBuffer, FrameStatus};
pub use io::PartialWrite;
pub use socket::Socket;
