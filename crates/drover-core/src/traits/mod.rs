// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams implemented by persistence backends.

pub mod store;

pub use store::BusStore;
