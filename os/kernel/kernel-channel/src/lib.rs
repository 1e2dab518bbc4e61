//! # Inter-Core Memory Channels
//!
//! Lock-free, single-producer single-consumer rings living in physical pages
//! shared between two cores. Every core pair talks through two channels, one
//! per direction, each made of a data page and a feedback page.
//!
//! ```text
//!   producer core                               consumer core
//! ┌──────────────┐   writes     ┌───────────┐   reads   ┌──────────────┐
//! │ Producer<T>  │─────────────►│ data page │──────────►│ Consumer<T>  │
//! │              │◄─────────────│ feedback  │◄──────────│              │
//! └──────────────┘   reads      └───────────┘   writes  └──────────────┘
//! ```
//!
//! ## Components
//!
//! * [`Producer`] / [`Consumer`]: the two typed ends of a ring ([`channel`])
//! * [`Message`]: marker for records that may be copied through shared memory,
//!   with [`CoreMessage`] as the control record of the core server ([`message`])
//! * [`PhysMapper`]: how a physical channel page becomes a pointer, with
//!   [`HhdmPhysMapper`] for the kernel's direct map ([`phys_mapper`])
//!
//! ## Ordering
//!
//! A message slot is written before the producer publishes its new head with
//! `Release`; the consumer loads that head with `Acquire` before touching the
//! slot. The feedback head follows the same rule in the other direction.
//!
//! Attaching to a channel never writes shared memory. Whoever owns the pages
//! clears them before either side attaches.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod channel;
pub mod message;
pub mod phys_mapper;

pub use channel::{ChannelError, Consumer, Producer};
pub use message::{CoreAction, CoreMessage, Message, UnknownAction};
pub use phys_mapper::{HhdmPhysMapper, PhysMapper};
