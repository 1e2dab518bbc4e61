//! # Core Bring-up Configuration and Boot Interface
//!
//! This crate defines the data structures and layout constants shared between
//! the master core that boots the machine and every core it starts. It is the
//! authoritative source for the boot-parameter block layout; a change here is
//! a breaking protocol change between master and slave boot code.
//!
//! ## Modules
//!
//! ### Core Descriptors ([`cores`])
//! * [`CoreId`](cores::CoreId): identifier of a physical core, `0` being the master
//! * [`CoreInfo`](cores::CoreInfo): the `#[repr(C)]` boot descriptor placed at
//!   the base of each core's partition, validated at construction
//! * [`SystemInformation`](cores::SystemInformation): what a running core knows
//!   about itself
//!
//! ### Memory Layout ([`memory`])
//! * Partition granularity, kernel window size, channel page count
//! * Kernel command capacity and the region limit for kernel images
//! * The HHDM base used to touch physical memory from the kernel
//!
//! ## Per-Core Partition Layout
//!
//! ```text
//! Physical memory, N cores, P = memPerCore:
//!
//! 0           ┌──────────────────────────────┐
//!             │ core0 (master, never claimed)│
//! P           ├──────────────────────────────┤
//!             │ core1: kernel | boot image | │
//!             │        channels | free       │
//! 2P - PAGE   ├╌╌╌╌╌╌ separator page ╌╌╌╌╌╌╌╌┤
//! 2P          ├──────────────────────────────┤
//!             │ core2 ...                    │
//!             └──────────────────────────────┘
//! ```
//!
//! ## ABI Compatibility
//!
//! * **`#[repr(C)]`**: predictable layout, pinned by compile-time size assertions
//! * **Fixed-Size Types**: explicit integer widths, no Rust enums with payloads
//! * **No Unsafe Code**: marked `#![deny(unsafe_code)]`

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod cores;
pub mod memory;
