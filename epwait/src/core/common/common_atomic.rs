// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Extension traits for [`AtomicU64`] and [`AtomicBool`] that hide [`SeqCst`]
//! boilerplate. See [`AtomicU64Ext`] for details.
//!
//! [`AtomicBool`]: std::sync::atomic::AtomicBool
//! [`AtomicU64`]: std::sync::atomic::AtomicU64
//! [`SeqCst`]: std::sync::atomic::Ordering::SeqCst

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Ergonomic helpers for [`AtomicU64`] counters.
///
/// All operations use [`SeqCst`] ordering so callers never have to choose.
///
/// ## The `fetch_add` quirk
///
/// [`AtomicU64::fetch_add`] returns the **old** value. [`add_and_get`] derives the new
/// value locally from that old value rather than issuing a second load, which could
/// observe another writer's update.
///
/// [`AtomicU64::fetch_add`]: std::sync::atomic::AtomicU64::fetch_add
/// [`AtomicU64`]: std::sync::atomic::AtomicU64
/// [`SeqCst`]: Ordering::SeqCst
/// [`add_and_get`]: Self::add_and_get
pub trait AtomicU64Ext {
    /// Atomically adds `delta` and returns the **new** value. Wraps on overflow.
    fn add_and_get(&self, delta: u64) -> u64;

    /// Atomically increments and returns the **new** value.
    fn increment(&self) -> u64 { self.add_and_get(1) }

    /// Reads the current value.
    fn get(&self) -> u64;

    /// Writes `value`.
    fn set(&self, value: u64);
}

impl AtomicU64Ext for AtomicU64 {
    fn add_and_get(&self, delta: u64) -> u64 {
        self.fetch_add(delta, Ordering::SeqCst).wrapping_add(delta)
    }

    fn get(&self) -> u64 { self.load(Ordering::SeqCst) }

    fn set(&self, value: u64) { self.store(value, Ordering::SeqCst) }
}

/// [`SeqCst`] get/set for [`AtomicBool`] flags.
///
/// [`AtomicBool`]: std::sync::atomic::AtomicBool
/// [`SeqCst`]: Ordering::SeqCst
pub trait AtomicBoolExt {
    fn get(&self) -> bool;
    fn set(&self, value: bool);
}

impl AtomicBoolExt for AtomicBool {
    fn get(&self) -> bool { self.load(Ordering::SeqCst) }

    fn set(&self, value: bool) { self.store(value, Ordering::SeqCst) }
}
