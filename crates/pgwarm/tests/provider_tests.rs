// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Integration tests for the provider against the in-memory engine.
//!
//! Tests cover:
//! - Distinct databases for concurrent callers
//! - Cluster sharing and isolation by identity
//! - Close and re-creation
//! - Failure propagation and recovery
//! - Connection descriptors
//! - Clusters outliving the runtime that created them

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use pgwarm::testing::{init_tracing, FakeLauncher, RecordingPreparer};
use pgwarm::{ClusterRegistry, EngineConfig, PreparedDbProvider, ProviderBuilder, ProviderError};
use pgwarm_config::LoggingConfig;

fn registry(launcher: &FakeLauncher) -> Arc<ClusterRegistry> {
	init_tracing(&LoggingConfig::default());
	Arc::new(ClusterRegistry::new(Arc::new(launcher.clone())))
}

fn builder(preparer: &RecordingPreparer, registry: &Arc<ClusterRegistry>) -> ProviderBuilder {
	PreparedDbProvider::builder(preparer.clone())
		.base_config(EngineConfig::default())
		.registry(Arc::clone(registry))
}

fn database_name(url: &str) -> String {
	let path = url.split('?').next().unwrap_or_default();
	path.rsplit('/').next().unwrap_or_default().to_string()
}

// ============================================================================
// Provisioning
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_get_distinct_databases() {
	let launcher = FakeLauncher::new();
	let registry = registry(&launcher);
	let provider = Arc::new(
		builder(&RecordingPreparer::new("schema"), &registry)
			.build()
			.await
			.unwrap(),
	);

	let mut handles = Vec::new();
	for _ in 0..16 {
		let provider = Arc::clone(&provider);
		handles.push(tokio::spawn(async move { provider.create_database().await }));
	}

	let mut names = HashSet::new();
	for handle in handles {
		let url = handle.await.unwrap().unwrap();
		assert!(names.insert(database_name(&url)), "duplicate database in {url}");
	}
	assert_eq!(names.len(), 16);

	provider.close().await;
}

#[tokio::test]
async fn test_descriptor_carries_properties_in_order() {
	let launcher = FakeLauncher::new();
	let registry = registry(&launcher);
	let provider = builder(&RecordingPreparer::new("schema"), &registry)
		.customize(|c| {
			c.set_connect_property("connect_timeout", "20");
		})
		.customize(|c| {
			c.set_connect_property("application_name", "suite");
		})
		.build()
		.await
		.unwrap();

	let url = provider.create_database().await.unwrap();
	let name = database_name(&url);
	let port = provider.cluster().runtime().port();
	assert_eq!(
		url,
		format!("postgresql://localhost:{port}/{name}?user=postgres&connect_timeout=20&application_name=suite")
	);
	assert_eq!(name.len(), 12);
	assert!(name.chars().all(|c| c.is_ascii_lowercase()));

	provider.close().await;
}

#[tokio::test]
async fn test_data_source_targets_new_database() {
	let launcher = FakeLauncher::new();
	let registry = registry(&launcher);
	let provider = builder(&RecordingPreparer::new("schema"), &registry)
		.build()
		.await
		.unwrap();

	let options = provider.create_data_source().await.unwrap();
	let database = options.get_database().unwrap().to_string();
	assert_eq!(options.get_port(), provider.cluster().runtime().port());
	assert_eq!(options.get_username(), "postgres");
	assert!(launcher.created().contains(&database));

	provider.close().await;
}

#[tokio::test]
async fn test_data_source_carries_configured_properties() {
	let launcher = FakeLauncher::new();
	let registry = registry(&launcher);
	let provider = builder(&RecordingPreparer::new("schema"), &registry)
		.customize(|c| {
			c.set_connect_property("statement_timeout", "20000");
		})
		.customize(|c| {
			c.set_connect_property("application_name", "suite");
		})
		.build()
		.await
		.unwrap();

	let options = provider.create_data_source().await.unwrap();
	assert_eq!(options.get_application_name(), Some("suite"));
	assert!(options
		.get_options()
		.is_some_and(|o| o.contains("statement_timeout=20000")));

	provider.close().await;
}

// ============================================================================
// Cluster identity
// ============================================================================

#[tokio::test]
async fn test_equal_identities_share_one_cluster() {
	let launcher = FakeLauncher::new();
	let registry = registry(&launcher);
	let preparer = RecordingPreparer::new("schema");

	let a = builder(&preparer, &registry)
		.customize(|c| {
			c.set_connect_property("connect_timeout", "20");
		})
		.build()
		.await
		.unwrap();
	let b = builder(&RecordingPreparer::new("schema"), &registry)
		.customize(|c| {
			c.set_connect_property("connect_timeout", "20");
		})
		.build()
		.await
		.unwrap();

	assert!(Arc::ptr_eq(a.cluster(), b.cluster()));
	assert_eq!(preparer.calls(), 1);
	assert_eq!(launcher.starts(), 1);
	assert_eq!(registry.len(), 1);

	a.close().await;
}

#[tokio::test]
async fn test_different_customizations_never_share() {
	let launcher = FakeLauncher::new();
	let registry = registry(&launcher);
	let first = RecordingPreparer::new("schema");
	let second = RecordingPreparer::new("schema");

	let a = builder(&first, &registry)
		.customize(|c| {
			c.set_connect_property("connect_timeout", "10");
		})
		.build()
		.await
		.unwrap();
	let b = builder(&second, &registry)
		.customize(|c| {
			c.set_connect_property("connect_timeout", "20");
		})
		.build()
		.await
		.unwrap();

	assert!(!Arc::ptr_eq(a.cluster(), b.cluster()));
	assert_eq!(first.calls(), 1);
	assert_eq!(second.calls(), 1);
	assert_eq!(launcher.starts(), 2);

	a.close().await;
	b.close().await;
}

#[tokio::test]
async fn test_close_then_rebuild_starts_new_cluster() {
	let launcher = FakeLauncher::new();
	let registry = registry(&launcher);
	let preparer = RecordingPreparer::new("schema");

	let first = builder(&preparer, &registry).build().await.unwrap();
	first.create_database().await.unwrap();
	first.close().await;
	assert!(registry.is_empty());
	assert_eq!(launcher.closes(), 1);

	let second = builder(&preparer, &registry).build().await.unwrap();
	assert!(!Arc::ptr_eq(first.cluster(), second.cluster()));
	assert_eq!(launcher.starts(), 2);
	assert_eq!(preparer.calls(), 2);
	second.create_database().await.unwrap();

	second.close().await;
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_admin_failures_propagate_and_recover() {
	let launcher = FakeLauncher::new();
	launcher.set_create_failures(true);
	let registry = registry(&launcher);
	let provider = builder(&RecordingPreparer::new("schema"), &registry)
		.build()
		.await
		.unwrap();

	for _ in 0..3 {
		assert!(matches!(
			provider.create_database().await,
			Err(ProviderError::Provisioning(_))
		));
	}

	launcher.set_create_failures(false);
	let mut recovered = false;
	for _ in 0..2 {
		if provider.create_database().await.is_ok() {
			recovered = true;
			break;
		}
	}
	assert!(recovered, "worker did not recover after the fault cleared");
	provider.create_database().await.unwrap();

	provider.close().await;
}

#[tokio::test]
async fn test_create_new_database_swallows_failures() {
	let launcher = FakeLauncher::new();
	launcher.set_create_failures(true);
	let registry = registry(&launcher);
	let provider = builder(&RecordingPreparer::new("schema"), &registry)
		.build()
		.await
		.unwrap();

	assert!(provider.create_new_database().await.is_none());
	assert!(provider.create_data_source().await.is_err());

	provider.close().await;
}

#[tokio::test]
async fn test_invalid_customization_creates_no_cluster() {
	let launcher = FakeLauncher::new();
	let registry = registry(&launcher);

	let result = builder(&RecordingPreparer::new("schema"), &registry)
		.customize(|c| {
			c.set_port(0);
		})
		.build()
		.await;

	assert!(matches!(result, Err(ProviderError::Configuration(_))));
	assert_eq!(launcher.starts(), 0);
	assert!(registry.is_empty());
}

#[tokio::test]
async fn test_startup_failure_installs_nothing() {
	let launcher = FakeLauncher::new();
	launcher.set_start_failure(true);
	let registry = registry(&launcher);
	let preparer = RecordingPreparer::new("schema");

	let result = builder(&preparer, &registry).build().await;
	assert!(matches!(result, Err(ProviderError::Startup(_))));
	assert!(registry.is_empty());
	assert_eq!(preparer.calls(), 0);

	launcher.set_start_failure(false);
	let provider = builder(&preparer, &registry).build().await.unwrap();
	provider.create_database().await.unwrap();
	provider.close().await;
}

#[tokio::test]
async fn test_preparation_failure_installs_nothing() {
	let launcher = FakeLauncher::new();
	let registry = registry(&launcher);

	let result = builder(&RecordingPreparer::failing("schema"), &registry)
		.build()
		.await;
	assert!(matches!(result, Err(ProviderError::Preparation(_))));
	assert!(registry.is_empty());
	assert_eq!(launcher.closes(), 1);
}

// ============================================================================
// Runtime independence
// ============================================================================

#[test]
fn test_cluster_outlives_creating_runtime() {
	let launcher = FakeLauncher::new();
	let registry = registry(&launcher);
	let preparer = RecordingPreparer::new("schema");

	let first_runtime = tokio::runtime::Runtime::new().unwrap();
	let provider = first_runtime.block_on(async {
		let provider = builder(&preparer, &registry).build().await.unwrap();
		provider.create_database().await.unwrap();
		provider
	});
	drop(first_runtime);

	let second_runtime = tokio::runtime::Runtime::new().unwrap();
	second_runtime.block_on(async {
		let url = tokio::time::timeout(Duration::from_secs(5), provider.create_database())
			.await
			.unwrap()
			.unwrap();
		assert!(url.starts_with("postgresql://localhost:"));
		provider.close().await;
	});
	assert_eq!(launcher.starts(), 1);
}
