// -*- coding: utf-8 -*-
// Copyright (C) 2025 Michael Büsch <m@bues.ch>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Execution context markers.
//!
//! The receiver state is shared between interrupt handlers and `main()`.
//! Functions that may only run in one of these contexts take the
//! corresponding marker as an argument.
//! The markers can only be constructed with `unsafe`, at ISR entry
//! or at the start of `main()`.

pub use critical_section::{CriticalSection, Mutex};

macro_rules! define_context {
    ($name:ident) => {
        pub struct $name<'cs>(CriticalSection<'cs>);

        impl<'cs> $name<'cs> {
            /// Create a new context.
            ///
            /// # SAFETY
            ///
            /// This may only be called from the corresponding context.
            /// `MainCtx` may only be constructed from `main()`
            /// and `IrqCtx` may only be constructed from ISRs.
            #[inline(always)]
            pub unsafe fn new() -> Self {
                // SAFETY: This cs is used with the `Mutex` primitives.
                //         The IRQ safety is upheld by the context machinery instead.
                //
                //         Interrupts never nest on the target. Therefore, an ISR
                //         holding an `IrqCtx` runs with IRQs disabled.
                //
                //         State that the main context shares with ISRs is only
                //         modified from `MainCtx` functions inside of a
                //         real `critical_section::with` block.
                let cs = unsafe { CriticalSection::new() };
                fence();
                Self(cs)
            }

            /// Get the `CriticalSection` that belongs to this context.
            #[inline(always)]
            pub fn cs(&self) -> CriticalSection<'cs> {
                self.0
            }

            /// Convert this to a generic context.
            #[inline(always)]
            pub fn to_any(&self) -> AnyCtx {
                AnyCtx::new()
            }
        }

        impl<'cs> Drop for $name<'cs> {
            #[inline(always)]
            fn drop(&mut self) {
                fence();
            }
        }
    };
}

define_context!(MainCtx);
define_context!(IrqCtx);

/// Generic context.
///
/// Only allows atomic single byte reads of shared state.
pub struct AnyCtx(());

impl AnyCtx {
    /// Create a new generic context.
    #[inline(always)]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(())
    }

    /// Get a `CriticalSection` for atomic read-only accesses.
    ///
    /// # SAFETY
    ///
    /// Everything done with the returned token must be safe w.r.t.
    /// a concurrently running interrupt handler.
    /// That means: only single byte reads.
    #[inline(always)]
    pub(crate) unsafe fn cs_for_atomic_read<'cs>(&self) -> CriticalSection<'cs> {
        // SAFETY: See the safety contract of this function.
        unsafe { CriticalSection::new() }
    }
}

/// Optimization and reordering fence.
#[inline(always)]
pub fn fence() {
    core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
}

// vim: ts=4 sw=4 expandtab
