#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

pub mod nic;
pub mod rtc;
pub mod serial;
pub mod tests;
