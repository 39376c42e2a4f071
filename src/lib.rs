//! A fixed-capacity, lock-free hash map for one writer and many readers.
//!
//! The map uses multi-choice open addressing: every key has a small, fixed
//! family of candidate slots chosen by independent hash functions, so
//! lookup, insertion and deletion all touch a bounded number of slots.
//! The slot array is sized at construction for the intended load factor
//! and never grows — an insertion that cannot be placed reports an error
//! instead of triggering a rehash.
//!
//! # Key Features
//!
//! - **Worst-case O(1) operations**: at most `max_probes` slots are ever
//!   inspected, and reads stop at the deepest probe any live entry uses.
//! - **No locks, no retry loops**: one writer publishes with release
//!   stores, any number of readers (including iterators) load with acquire
//!   ordering. There is no CAS spinning anywhere.
//! - **Single-writer by construction**: building a map yields one
//!   non-cloneable [`Writer`] and a cloneable [`Reader`], so the
//!   one-writer/many-readers protocol is enforced by the type system.
//! - **Optional slot recycling**: given a value-to-key derivation, deleted
//!   slots are cleared in place and reused without allocating; reads then
//!   validate each value against the key it is supposed to derive, which
//!   rejects stale values from recycled slots.
//! - **Memory reclamation**: unlinked records are reclaimed through
//!   epoch-based reclamation, so readers never touch freed memory.
//!
//! Reads are eventually consistent: a freshly inserted entry may be missed
//! for a short window, but once a reader has observed it, it stays
//! observable until the writer deletes it. Value overwrites behave the
//! same way.
//!
//! # Example
//!
//! ```
//! use std::thread;
//!
//! let (mut writer, reader) = swmr_map::with_capacity(1024);
//!
//! let observer = {
//!     let reader = reader.clone();
//!     thread::spawn(move || {
//!         // Runs against a live map; absent is a normal answer.
//!         for key in 0..100u64 {
//!             let _ = reader.get(&key);
//!         }
//!     })
//! };
//!
//! for key in 0..100u64 {
//!     writer.insert(key, key * 2).unwrap();
//! }
//! observer.join().unwrap();
//!
//! assert_eq!(writer.len(), 100);
//! assert_eq!(reader.get(&7), Some(14));
//! ```

#![warn(missing_docs)]

mod error;
mod iter;
mod map;
mod probe;
mod slot;

pub use error::InsertError;
pub use iter::{Iter, Keys, Values};
pub use map::{with_capacity, Builder, Reader, Writer};
