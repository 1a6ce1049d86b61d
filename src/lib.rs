// Copyright 2025 RelCalc Project Authors. Licensed under Apache-2.0.

//! A relational query translator.
//!
//! `relcalc` lowers three query notations into one relational-algebra
//! operator vocabulary and evaluates the resulting trees against a catalog
//! of in-memory relations:
//!
//! - SQL, parsed with [`sqlparser`] ([`translator::sql`]);
//! - tuple relational calculus ([`translator::trc`]);
//! - a native relational-algebra AST ([`translator::algebra`]).
//!
//! The interesting path is the calculus: a declarative formula becomes an
//! operational tree by propagating negation to the leaves, eliminating
//! universal quantifiers and turning correlated existentials into
//! semi-joins. See [`translator::trc`] for the details.

#![deny(unused_must_use)]

pub mod algebra;
pub mod catalog;
mod db;
pub mod executor;
pub mod expr;
pub mod parser;
pub mod translator;
pub mod types;

pub use self::db::{Database, Error};
