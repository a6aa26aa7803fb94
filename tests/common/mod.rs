//! Test fixtures: an in-memory cloud with a provisioner and an enumerator
//!
//! Created objects are stored with the identity tags of the request, so a
//! second run over the same graph adopts them instead of creating duplicates.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value as Json};

use provisio::{
    ExternalObject, ExternalScope, ProvisionRequest, ProvisionedOutputs, Provisioner,
    ProvisionerRegistry, ResourceEnumerator, ResourceKind,
};

pub const IDENTITY_TAG: &str = "provisio-resource-name";
pub const REDIS: &str = "cloud.redis.v0";

#[derive(Default)]
pub struct FakeCloud {
    objects: Mutex<Vec<ExternalObject>>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    cancelling: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    params: Mutex<HashMap<String, Json>>,
    creates: AtomicUsize,
    adopts: AtomicUsize,
    listings: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make create/adopt of `name` fail
    pub fn fail(&self, name: &str) {
        self.failing.lock().insert(name.to_string());
    }

    /// Make create/adopt of `name` panic
    pub fn panic_on(&self, name: &str) {
        self.panicking.lock().insert(name.to_string());
    }

    /// Cancel the run from inside the (successful) call for `name`
    pub fn cancel_during(&self, name: &str) {
        self.cancelling.lock().insert(name.to_string());
    }

    /// Make create/adopt of `name` take `delay`
    pub fn delay(&self, name: &str, delay: Duration) {
        self.delays.lock().insert(name.to_string(), delay);
    }

    /// Pre-existing object tagged with `identity`
    pub fn seed(&self, id: &str, identity: &str) {
        self.objects.lock().push(
            ExternalObject::new(id, identity)
                .with_tag(IDENTITY_TAG, identity)
                .with_properties(json!({ "seeded": true })),
        );
    }

    pub fn objects(&self) -> Vec<ExternalObject> {
        self.objects.lock().clone()
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn adopts(&self) -> usize {
        self.adopts.load(Ordering::SeqCst)
    }

    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Resolved parameters received by the last call for `name`
    pub fn params_of(&self, name: &str) -> Option<Json> {
        self.params.lock().get(name).cloned()
    }

    pub fn registry(self: &Arc<Self>, kinds: &[&str]) -> ProvisionerRegistry {
        let mut registry = ProvisionerRegistry::new();
        for kind in kinds {
            registry
                .register_provisioner(*kind, Arc::new(FakeProvisioner(Arc::clone(self))))
                .register_enumerator(*kind, Arc::new(FakeEnumerator(Arc::clone(self))));
        }
        registry
    }

    /// Registry with provisioners only (no reconciliation)
    pub fn registry_without_enumerators(self: &Arc<Self>, kinds: &[&str]) -> ProvisionerRegistry {
        let mut registry = ProvisionerRegistry::new();
        for kind in kinds {
            registry.register_provisioner(*kind, Arc::new(FakeProvisioner(Arc::clone(self))));
        }
        registry
    }

    async fn call(&self, request: &ProvisionRequest) -> anyhow::Result<ProvisionedOutputs> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.params
            .lock()
            .insert(request.name().to_string(), request.parameters.to_json());

        let delay = self.delays.lock().get(request.name()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.lock().contains(request.name()) {
            panic!("provisioner crashed on '{}'", request.name());
        }
        if self.failing.lock().contains(request.name()) {
            anyhow::bail!("deployment of '{}' rejected: quota exceeded", request.name());
        }
        if self.cancelling.lock().contains(request.name()) {
            request.cancel.cancel();
        }
        Ok(outputs_for(request.name()))
    }
}

/// Deterministic outputs of a resource
pub fn outputs_for(name: &str) -> ProvisionedOutputs {
    ProvisionedOutputs::new()
        .with_output("id", format!("/fake/{}", name))
        .with_output("fqdn", format!("{}.fake.net", name))
        .with_secret_output("connectionString", format!("{}.fake.net;key=secret-{}", name, name))
        .with_secret_output("pwd", format!("pw-{}", name))
}

pub struct FakeProvisioner(pub Arc<FakeCloud>);

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn create(&self, request: &ProvisionRequest) -> anyhow::Result<ProvisionedOutputs> {
        let outputs = self.0.call(request).await?;
        self.0.creates.fetch_add(1, Ordering::SeqCst);

        let mut object = ExternalObject::new(format!("/fake/{}", request.name()), request.name());
        object.tags = request.tags.clone();
        self.0.objects.lock().push(object);
        Ok(outputs)
    }

    async fn adopt(
        &self,
        request: &ProvisionRequest,
        _existing: &ExternalObject,
    ) -> anyhow::Result<ProvisionedOutputs> {
        let outputs = self.0.call(request).await?;
        self.0.adopts.fetch_add(1, Ordering::SeqCst);
        Ok(outputs)
    }
}

pub struct FakeEnumerator(pub Arc<FakeCloud>);

impl ResourceEnumerator for FakeEnumerator {
    fn list<'a>(&'a self, _scope: &'a ExternalScope) -> BoxStream<'a, anyhow::Result<ExternalObject>> {
        self.0.listings.fetch_add(1, Ordering::SeqCst);
        stream::iter(self.0.objects().into_iter().map(Ok)).boxed()
    }
}

pub fn bicep() -> ResourceKind {
    ResourceKind::new(ResourceKind::BICEP)
}
