pub mod config;
pub mod error;
pub mod pointer;
pub mod process;
pub mod vector;
pub mod watch;

pub use config::{
    HexAddress, HexValue, WatchDefinition, WatchListConfig, build_watch_list, load_watch_list,
    parse_watch_list, save_watch_list,
};
pub use error::{Error, Result};
pub use pointer::{DeepPointer, DerefType, PointerBase};
pub use process::{ModuleInfo, ReadString, ReadStringType, TargetProcess};
pub use vector::Vector3f;
pub use watch::{Change, ValueType, Watch, WatchList, WatchValue};
