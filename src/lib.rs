/*!
    host driver for a multi-drop serial bus of dual channel motor control boards

    - [command], [codec] and [parameters] describe the wire protocol and are usable without `std`
    - [master] is the host side driver, synchronizing boards state at a fixed rate over the bus
*/
#![no_std]
#[cfg(feature = "std")]
extern crate std;

mod mutex;
mod utils;

pub mod command;
pub mod codec;
pub mod parameters;
#[cfg(feature = "master")]
pub mod master;
