// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Schema preparers and their identity.
//!
//! A [`SchemaPreparer`] runs once per cluster against the template database.
//! Two providers share a cluster only when their preparers compare equal, so
//! every preparer type must be `Eq + Hash`. [`PreparerKey`] erases the
//! concrete type while keeping that comparison: values of different types
//! are never equal.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::TemplateDatabase;
use crate::error::PreparationError;

/// Populates a template database with schema and data.
///
/// Implementations must close every connection they open before returning.
#[async_trait]
pub trait SchemaPreparer: fmt::Debug + Send + Sync + 'static {
	async fn prepare(&self, template: &TemplateDatabase) -> Result<(), PreparationError>;
}

trait KeyedPreparer: SchemaPreparer {
	fn as_any(&self) -> &dyn Any;
	fn dyn_eq(&self, other: &dyn KeyedPreparer) -> bool;
	fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<T: SchemaPreparer + Eq + Hash> KeyedPreparer for T {
	fn as_any(&self) -> &dyn Any {
		self
	}

	fn dyn_eq(&self, other: &dyn KeyedPreparer) -> bool {
		other
			.as_any()
			.downcast_ref::<T>()
			.is_some_and(|other| self == other)
	}

	fn dyn_hash(&self, mut state: &mut dyn Hasher) {
		TypeId::of::<T>().hash(&mut state);
		self.hash(&mut state);
	}
}

/// A type-erased, comparable schema preparer.
#[derive(Clone)]
pub struct PreparerKey(Arc<dyn KeyedPreparer>);

impl PreparerKey {
	pub fn new<P: SchemaPreparer + Eq + Hash>(preparer: P) -> Self {
		Self(Arc::new(preparer))
	}

	pub async fn prepare(&self, template: &TemplateDatabase) -> Result<(), PreparationError> {
		self.0.prepare(template).await
	}
}

impl PartialEq for PreparerKey {
	fn eq(&self, other: &Self) -> bool {
		self.0.dyn_eq(other.0.as_ref())
	}
}

impl Eq for PreparerKey {}

impl Hash for PreparerKey {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.0.dyn_hash(state);
	}
}

impl fmt::Debug for PreparerKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&*self.0, f)
	}
}
