#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod config;
mod error;
mod heap;
mod job;
mod pool;

pub use crate::config::*;
pub use crate::error::*;
pub use crate::heap::*;
pub use crate::job::*;
pub use crate::pool::*;
