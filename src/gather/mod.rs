//! The gathering engine: a three-stage pipeline (prepare, gather, inspect)
//! downloading every listable resource from one cluster into a directory tree.

mod queue;

pub use queue::{WorkFuture, WorkQueue};

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::FutureExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DynamicObject, ListParams};
use kube::core::ObjectList;
use kube::discovery::{verbs, ApiCapabilities, ApiResource, Discovery, Scope};
use kube::{Client, ResourceExt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::addons::{self, Addon};
use crate::error::{is_not_found, is_resource_expired, GatherError, Result};
use crate::output::OutputDirectory;

// This value keeps list payload size under 4 MiB in most cases. Higher values
// decrease the number of requests and increase memory usage per request.
const LIST_RESOURCES_LIMIT: u32 = 100;

// Number of workers serving a work queue.
const WORK_QUEUE_SIZE: usize = 6;

/// Per-cluster gathering options.
#[derive(Clone, Debug, Default)]
pub struct Options {
    /// Context name, used for labeling log messages.
    pub context: String,

    /// Gather only these namespaces. `None` gathers all namespaces; an empty
    /// list or an empty name is invalid.
    pub namespaces: Option<Vec<String>>,

    /// Enable only these addons. `None` enables all addons; an empty list
    /// disables all of them.
    pub addons: Option<Vec<String>>,
}

impl Options {
    fn validate(&self) -> Result<()> {
        if let Some(namespaces) = &self.namespaces {
            if namespaces.is_empty() || namespaces.iter().any(|ns| ns.is_empty()) {
                return Err(GatherError::Config(
                    "namespaces filter must name at least one non-empty namespace".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// A gatherable resource type: the dynamic API resource plus its scope.
#[derive(Clone, Debug)]
pub struct ResourceInfo {
    pub resource: ApiResource,
    pub namespaced: bool,
}

impl ResourceInfo {
    pub fn namespaced(resource: ApiResource) -> Self {
        Self {
            resource,
            namespaced: true,
        }
    }

    pub fn cluster(resource: ApiResource) -> Self {
        Self {
            resource,
            namespaced: false,
        }
    }

    /// The full name of the resource, used as the directory name in the
    /// gather tree. Resources with an empty group use the plural name alone;
    /// resources with a group are nested in a group directory.
    pub fn name(&self) -> String {
        if self.resource.group.is_empty() {
            self.resource.plural.clone()
        } else {
            format!("{}/{}", self.resource.group, self.resource.plural)
        }
    }

    /// The canonical de-dup key for an object of this resource.
    pub fn key(&self, namespace: Option<&str>, name: &str) -> String {
        if self.namespaced {
            format!(
                "namespaces/{}/{}/{}",
                namespace.unwrap_or_default(),
                self.name(),
                name
            )
        } else {
            format!("cluster/{}/{}", self.name(), name)
        }
    }

    fn key_for(&self, item: &DynamicObject) -> String {
        self.key(item.namespace().as_deref(), &item.name_any())
    }
}

/// Capability bundle exposed to addons: the shared client, the output sink,
/// the gathering options, the inspect queue, and single-object fetches with
/// de-duplication.
pub struct AddonBackend {
    client: Client,
    output: OutputDirectory,
    opts: Options,
    inspect_queue: Arc<WorkQueue>,
    resources: Mutex<HashSet<String>>,
}

impl AddonBackend {
    /// The client connected to the cluster.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The output sink for this gathering.
    pub fn output(&self) -> &OutputDirectory {
        &self.output
    }

    /// Gathering options for this cluster.
    pub fn options(&self) -> &Options {
        &self.opts
    }

    /// Submit follow-up work onto the inspect queue.
    pub async fn queue(&self, work: WorkFuture) -> Result<()> {
        self.inspect_queue.queue(work).await
    }

    /// Fetch and dump a single object by identity, with de-duplication.
    /// Used by addons for cross-reference gathering. Best-effort: fetch and
    /// dump failures are logged, not returned.
    pub async fn gather_resource(
        &self,
        resource: ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) {
        let start = Instant::now();

        let r = ResourceInfo {
            resource,
            namespaced: namespace.is_some(),
        };

        let key = r.key(namespace, name);
        if !self.add_resource(&key) {
            return;
        }

        let api = self.dynamic_api(&r, namespace);
        let item = match api.get(name).await {
            Ok(item) => item,
            Err(err) => {
                warn!("Cannot get {key:?}: {err}");
                return;
            }
        };

        if let Err(err) = self.dump_resource(&r, &item).await {
            warn!("Cannot dump {key:?}: {err}");
            return;
        }

        debug!(
            "Gathered {key:?} in {:.3} seconds",
            start.elapsed().as_secs_f64()
        );
    }

    /// Record a resource key, returning true if this caller is the first
    /// writer. The set's final contents enumerate the on-disk object files.
    fn add_resource(&self, key: &str) -> bool {
        let mut resources = self.resources.lock().expect("resource set lock poisoned");
        if resources.contains(key) {
            return false;
        }

        resources.insert(key.to_string());
        true
    }

    fn resource_count(&self) -> usize {
        self.resources.lock().expect("resource set lock poisoned").len()
    }

    fn dynamic_api(&self, r: &ResourceInfo, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) if r.namespaced => Api::namespaced_with(self.client.clone(), ns, &r.resource),
            _ => Api::all_with(self.client.clone(), &r.resource),
        }
    }

    async fn list_resources(
        &self,
        r: &ResourceInfo,
        namespace: Option<&str>,
        params: &ListParams,
    ) -> kube::Result<ObjectList<DynamicObject>> {
        let start = Instant::now();

        let list = self.dynamic_api(r, namespace).list(params).await?;

        debug!(
            "Listed {} {:?} in {:.3} seconds",
            list.items.len(),
            r.name(),
            start.elapsed().as_secs_f64()
        );

        Ok(list)
    }

    async fn dump_resource(&self, r: &ResourceInfo, item: &DynamicObject) -> Result<()> {
        let data = serde_yaml::to_string(item)?;

        let mut dst = if r.namespaced {
            self.output
                .create_namespaced_resource(
                    item.namespace().as_deref().unwrap_or_default(),
                    &r.name(),
                    &item.name_any(),
                )
                .await?
        } else {
            self.output
                .create_cluster_resource(&r.name(), &item.name_any())
                .await?
        };

        dst.write_all(data.as_bytes()).await?;
        dst.flush().await?;
        Ok(())
    }
}

/// One gathering job for one cluster. Create with [`Gatherer::new`], run with
/// [`Gatherer::gather`], then read the unique object count with
/// [`Gatherer::count`].
pub struct Gatherer {
    backend: Arc<AddonBackend>,
    addons: Arc<HashMap<String, Box<dyn Addon>>>,
    gather_queue: WorkQueue,
    inspect_queue: Arc<WorkQueue>,
}

impl Gatherer {
    pub fn new(client: Client, directory: impl Into<PathBuf>, opts: Options) -> Result<Self> {
        opts.validate()?;

        let inspect_queue = Arc::new(WorkQueue::new(WORK_QUEUE_SIZE));

        let backend = Arc::new(AddonBackend {
            client,
            output: OutputDirectory::new(directory),
            opts,
            inspect_queue: inspect_queue.clone(),
            resources: Mutex::new(HashSet::new()),
        });

        let addons = addons::create_addons(&backend)?;

        Ok(Self {
            backend,
            addons: Arc::new(addons),
            gather_queue: WorkQueue::new(WORK_QUEUE_SIZE),
            inspect_queue,
        })
    }

    /// Run the three-stage pipeline to completion. Per-unit failures are
    /// logged and latched; only the first error of each queue is surfaced.
    pub async fn gather(&self) -> Result<()> {
        let start = Instant::now();
        self.gather_queue.start();
        self.inspect_queue.start();

        // The prepare step looks up namespaces and API resources and queues
        // work on the gather queue.
        let prepared = self.prepare().await;
        debug!(
            "Prepare step finished in {:.2} seconds",
            start.elapsed().as_secs_f64()
        );

        // No more work can be queued on the gather queue so we can close it.
        // Closing is safe even if prepare failed with work already queued.
        self.gather_queue.close();
        let gather_err = self.gather_queue.wait().await;
        debug!(
            "Gather step finished in {:.2} seconds",
            start.elapsed().as_secs_f64()
        );

        // Gather workers are done, so no more work can be queued on the
        // inspect queue and we can close it.
        self.inspect_queue.close();
        let inspect_err = self.inspect_queue.wait().await;
        debug!(
            "Inspect step finished in {:.2} seconds",
            start.elapsed().as_secs_f64()
        );

        prepared?;

        match (gather_err, inspect_err) {
            (None, None) => Ok(()),
            (gather, inspect) => Err(GatherError::Gather {
                gather: gather.map_or_else(|| "none".to_string(), |e| e.to_string()),
                inspect: inspect.map_or_else(|| "none".to_string(), |e| e.to_string()),
            }),
        }
    }

    /// Number of unique resources gathered.
    pub fn count(&self) -> usize {
        self.backend.resource_count()
    }

    async fn prepare(&self) -> Result<()> {
        let mut namespaces: Vec<Option<String>> = Vec::new();

        if self.backend.options().namespaces.is_some() {
            let found = self.gather_namespaces().await?;
            if found.is_empty() {
                // Expected when gathering a namespace from multiple clusters
                // and it exists only on some of them.
                debug!("No namespace to gather");
                return Ok(());
            }
            namespaces.extend(found.into_iter().map(Some));
        } else {
            namespaces.push(None);
        }

        let resources = self
            .list_api_resources()
            .await
            .map_err(|e| GatherError::Config(format!("Cannot list api resources: {e}")))?;

        for r in &resources {
            for namespace in &namespaces {
                let backend = self.backend.clone();
                let addons = self.addons.clone();
                let r = r.clone();
                let namespace = namespace.clone();

                self.gather_queue
                    .queue(
                        async move {
                            gather_resources(&backend, &addons, &r, namespace.as_deref()).await;
                            Ok(())
                        }
                        .boxed(),
                    )
                    .await?;
            }
        }

        Ok(())
    }

    /// Gather the requested namespaces and return the ones available on this
    /// cluster. A missing namespace is skipped; any other lookup failure is
    /// fatal since nothing can be gathered.
    async fn gather_namespaces(&self) -> Result<Vec<String>> {
        let r = ResourceInfo::cluster(ApiResource::erase::<Namespace>(&()));
        let api: Api<DynamicObject> = Api::all_with(self.backend.client().clone(), &r.resource);

        let mut found = Vec::new();

        for namespace in self.backend.options().namespaces.clone().unwrap_or_default() {
            let ns = match api.get(&namespace).await {
                Ok(ns) => ns,
                Err(err) if is_not_found(&err) => {
                    debug!("Skipping missing namespace {namespace:?}");
                    continue;
                }
                Err(err) => {
                    return Err(GatherError::Namespace {
                        namespace,
                        source: err,
                    })
                }
            };

            let key = r.key_for(&ns);
            if self.backend.add_resource(&key) {
                if let Err(err) = self.backend.dump_resource(&r, &ns).await {
                    warn!("Cannot dump {key:?}: {err}");
                }
            }

            found.push(namespace);
        }

        Ok(found)
    }

    async fn list_api_resources(&self) -> kube::Result<Vec<ResourceInfo>> {
        let start = Instant::now();

        let discovery = Discovery::new(self.backend.client().clone()).run().await?;
        let filtered = self.backend.options().namespaces.is_some();

        let mut resources = Vec::new();

        for group in discovery.groups() {
            for (resource, caps) in group.recommended_resources() {
                if !should_gather(filtered, &resource, &caps) {
                    continue;
                }

                resources.push(ResourceInfo {
                    namespaced: matches!(caps.scope, Scope::Namespaced),
                    resource,
                });
            }
        }

        debug!(
            "Listed {} api resources in {:.3} seconds",
            resources.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(resources)
    }
}

/// Decide if a discovered resource is eligible for gathering.
fn should_gather(filtered: bool, resource: &ApiResource, caps: &ApiCapabilities) -> bool {
    // We cannot gather resources we cannot list.
    if !caps.supports_operation(verbs::LIST) {
        return false;
    }

    if filtered {
        // Gathering specific namespaces uses only namespaced resources.
        if !matches!(caps.scope, Scope::Namespaced) {
            return false;
        }

        // olm bug - returned for *every* namespace when listing by namespace.
        // https://github.com/operator-framework/operator-lifecycle-manager/issues/2932
        if resource.plural == "packagemanifests"
            && resource.group == "packages.operators.coreos.com"
        {
            return false;
        }
    }

    // Skip "events", replaced by "events.events.k8s.io". Otherwise we get
    // every event twice, once under each resource name.
    if resource.plural == "events" && resource.group.is_empty() {
        return false;
    }

    // Deprecated since v1.19, listing it only produces warnings.
    if resource.plural == "componentstatuses" && resource.group.is_empty() {
        return false;
    }

    true
}

/// One gather-queue unit: list all objects of one resource in one namespace
/// (or cluster-wide), dump new ones, and let a bound addon inspect them.
/// Failures stop only this unit.
async fn gather_resources(
    backend: &AddonBackend,
    addons: &HashMap<String, Box<dyn Addon>>,
    r: &ResourceInfo,
    namespace: Option<&str>,
) {
    let start = Instant::now();

    let mut params = ListParams {
        limit: Some(LIST_RESOURCES_LIMIT),
        ..Default::default()
    };
    let mut count = 0;

    loop {
        let list = match backend.list_resources(r, namespace, &params).await {
            Ok(list) => list,
            Err(err) => {
                // Fall back to a full list only when a continuation attempt
                // failed because the list snapshot expired.
                if params.continue_token.is_none() || !is_resource_expired(&err) {
                    warn!("Cannot list {:?}: {err}", r.name());
                    break;
                }

                debug!("Falling back to full list for {:?}: {err}", r.name());

                params = ListParams::default();
                count = 0;

                match backend.list_resources(r, namespace, &params).await {
                    Ok(list) => list,
                    Err(err) => {
                        warn!("Cannot list {:?}: {err}", r.name());
                        break;
                    }
                }
            }
        };

        let addon = addons.get(&r.name());

        for item in &list.items {
            let key = r.key_for(item);

            if !backend.add_resource(&key) {
                continue;
            }

            count += 1;

            if let Err(err) = backend.dump_resource(r, item).await {
                warn!("Cannot dump {key:?}: {err}");
            }

            if let Some(addon) = addon {
                if let Err(err) = addon.inspect(item).await {
                    warn!("Cannot inspect {key:?}: {err}");
                }
            }
        }

        match list.metadata.continue_ {
            Some(token) if !token.is_empty() => params.continue_token = Some(token),
            _ => break,
        }
    }

    debug!(
        "Gathered {count} {:?} in {:.3} seconds",
        r.name(),
        start.elapsed().as_secs_f64()
    );
}
