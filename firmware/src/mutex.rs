// -*- coding: utf-8 -*-
// Copyright (C) 2025 Michael Büsch <m@bues.ch>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use avr_usi_rx::{MainCtx, context::Mutex};
use core::{cell::{Cell, UnsafeCell}, mem::MaybeUninit, ops::Deref};

/// Main context initialization marker.
///
/// This marker does not have a pub constructor.
/// It is only created by [main_ctx_with_init].
pub struct MainInitCtx(());

/// Create the [MainCtx] and run the static variable initialization before.
///
/// # SAFETY
///
/// The safety contract of [MainCtx::new] must be upheld.
/// Interrupts must be disabled.
#[inline(always)]
pub unsafe fn main_ctx_with_init<'cs, F: FnOnce(&MainInitCtx)>(f: F) -> MainCtx<'cs> {
    // We are creating the MainCtx.
    // Therefore, it's safe to construct the MainInitCtx marker.
    f(&MainInitCtx(()));
    // SAFETY: Safety contract of MainCtx::new is upheld by the caller.
    unsafe { MainCtx::new() }
}

/// Lazy initialization of static variables.
pub struct LazyMainInit<T>(UnsafeCell<MaybeUninit<T>>);

impl<T> LazyMainInit<T> {
    /// # SAFETY
    ///
    /// It must be ensured that the returned instance is initialized
    /// with a call to [Self::init] during construction of the [MainCtx].
    /// See [main_ctx_with_init].
    ///
    /// Using this object in any way before initializing it will
    /// result in Undefined Behavior.
    #[inline(always)]
    pub const unsafe fn uninit() -> Self {
        Self(UnsafeCell::new(MaybeUninit::uninit()))
    }

    #[inline(always)]
    pub fn init(&self, _m: &MainInitCtx, inner: T) {
        // SAFETY: Initialization is required for the `assume_init` calls.
        //         Interrupts are disabled during MainInitCtx lifetime.
        unsafe { *self.0.get() = MaybeUninit::new(inner) };
    }
}

impl<T> Deref for LazyMainInit<T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        // SAFETY: the `Self::uninit` safety contract ensures that `Self::init` is called
        //         before interrupts are enabled and before anything else uses us.
        unsafe { (*self.0.get()).assume_init_ref() }
    }
}

// SAFETY: If T is Send, then we can Send the whole object. The object only contains T state.
unsafe impl<T: Send> Send for LazyMainInit<T> {}

// SAFETY: The content is only written once, during init with interrupts disabled.
//         Afterwards it is only accessed via shared references.
//         The peripheral register blocks stored in here do their own interior mutability.
unsafe impl<T> Sync for LazyMainInit<T> {}

/// A cell that can only be accessed from main context.
pub struct MutexCell<T> {
    inner: Mutex<Cell<T>>,
}

impl<T> MutexCell<T> {
    #[inline]
    pub const fn new(inner: T) -> Self {
        Self {
            inner: Mutex::new(Cell::new(inner)),
        }
    }
}

impl<T: Copy> MutexCell<T> {
    #[inline]
    pub fn get(&self, m: &MainCtx<'_>) -> T {
        self.inner.borrow(m.cs()).get()
    }

    #[inline]
    pub fn set(&self, m: &MainCtx<'_>, inner: T) {
        self.inner.borrow(m.cs()).set(inner);
    }
}

/// Cheaper Option::unwrap() alternative.
///
/// This is cheaper, because it doesn't call into the panic unwind path.
/// Therefore, it does not impose caller-saves overhead onto the calling function.
#[inline(always)]
pub fn unwrap_option<T>(value: Option<T>) -> T {
    match value {
        Some(value) => value,
        None => reset_system(),
    }
}

/// Reset the system.
#[inline(always)]
#[allow(clippy::empty_loop)]
pub fn reset_system() -> ! {
    loop {
        // Wait for the watchdog timer to trigger and reset the system.
        // We don't need to disable interrupts here.
        // No interrupt will reset the watchdog timer.
    }
}

#[inline(always)]
#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    reset_system();
}

// vim: ts=4 sw=4 expandtab
