//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::future;
use std::sync::{Arc, PoisonError};

use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::backend::{
    BackendFuture, NetworkBackend, NetworkError, SecurityGroup, SecurityGroupRule,
};
use crate::firewall::BackendRule;
use crate::selector::InstanceType;
use crate::storage::{CatalogStore, DEFAULT_STREAM_VERSION, StoreError, unsigned_index_path};

/// Backend operation a scripted failure applies to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NetworkOp {
    /// [`NetworkBackend::group_by_name`].
    GroupByName,
    /// [`NetworkBackend::create_group`].
    CreateGroup,
    /// [`NetworkBackend::add_rule`].
    AddRule,
    /// [`NetworkBackend::delete_group`].
    DeleteGroup,
}

/// Records a single call made through [`FakeNetwork`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NetworkCall {
    /// Lookup by group name.
    GroupByName(String),
    /// Group creation by name.
    CreateGroup(String),
    /// Rule addition to a group id.
    AddRule {
        /// Target group id.
        group_id: String,
        /// Rule requested.
        rule: BackendRule,
    },
    /// Group deletion by id.
    DeleteGroup(String),
}

#[derive(Debug, Default)]
struct FakeState {
    groups: BTreeMap<String, SecurityGroup>,
    calls: Vec<NetworkCall>,
    failures: VecDeque<(NetworkOp, NetworkError)>,
    hidden_lookups: usize,
    next_rule: u64,
}

impl FakeState {
    fn take_failure(&mut self, op: NetworkOp) -> Option<NetworkError> {
        let position = self.failures.iter().position(|(queued, _)| *queued == op)?;
        self.failures.remove(position).map(|(_, err)| err)
    }

    fn group_by_id_mut(&mut self, group_id: &str) -> Option<&mut SecurityGroup> {
        self.groups.values_mut().find(|group| group.id == group_id)
    }
}

/// In-memory network control plane with scripted failures.
///
/// Duplicate group names yield [`NetworkError::AlreadyExists`] and
/// duplicate rules [`NetworkError::RuleExists`], mirroring real providers.
/// Clones share state.
#[derive(Clone, Debug, Default)]
pub struct FakeNetwork {
    state: Arc<std::sync::Mutex<FakeState>>,
}

impl FakeNetwork {
    /// Creates an empty control plane.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds a group holding `rules` and returns it.
    pub fn seed_group(&self, name: &str, rules: &[BackendRule]) -> SecurityGroup {
        let mut state = self.lock();
        let mut group = SecurityGroup::empty(format!("sg-{}", Uuid::new_v4().simple()), name);
        for rule in rules {
            state.next_rule += 1;
            group.rules.push(SecurityGroupRule {
                id: format!("rule-{}", state.next_rule),
                rule: rule.clone(),
            });
        }
        state.groups.insert(name.to_owned(), group.clone());
        group
    }

    /// Makes the next call of `op` fail with `err`.
    pub fn fail_next(&self, op: NetworkOp, err: NetworkError) {
        self.lock().failures.push_back((op, err));
    }

    /// Makes the next lookup report no group even when one exists, as if
    /// another caller created it concurrently.
    pub fn hide_next_lookup(&self) {
        self.lock().hidden_lookups += 1;
    }

    /// Returns a snapshot of all calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<NetworkCall> {
        self.lock().calls.clone()
    }

    /// Number of rule additions attempted.
    #[must_use]
    pub fn add_rule_calls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, NetworkCall::AddRule { .. }))
            .count()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Current state of the group `name`.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<SecurityGroup> {
        self.lock().groups.get(name).cloned()
    }

    fn lookup(&self, name: &str) -> Result<Option<SecurityGroup>, NetworkError> {
        let mut state = self.lock();
        state.calls.push(NetworkCall::GroupByName(name.to_owned()));
        if let Some(err) = state.take_failure(NetworkOp::GroupByName) {
            return Err(err);
        }
        if state.hidden_lookups > 0 {
            state.hidden_lookups -= 1;
            return Ok(None);
        }
        Ok(state.groups.get(name).cloned())
    }

    fn create(&self, name: &str) -> Result<SecurityGroup, NetworkError> {
        let mut state = self.lock();
        state.calls.push(NetworkCall::CreateGroup(name.to_owned()));
        if let Some(err) = state.take_failure(NetworkOp::CreateGroup) {
            return Err(err);
        }
        if state.groups.contains_key(name) {
            return Err(NetworkError::AlreadyExists {
                name: name.to_owned(),
            });
        }
        let group = SecurityGroup::empty(format!("sg-{}", Uuid::new_v4().simple()), name);
        state.groups.insert(name.to_owned(), group.clone());
        Ok(group)
    }

    fn add(&self, group_id: &str, rule: &BackendRule) -> Result<SecurityGroupRule, NetworkError> {
        let mut state = self.lock();
        state.calls.push(NetworkCall::AddRule {
            group_id: group_id.to_owned(),
            rule: rule.clone(),
        });
        if let Some(err) = state.take_failure(NetworkOp::AddRule) {
            return Err(err);
        }
        state.next_rule += 1;
        let id = format!("rule-{}", state.next_rule);
        let Some(group) = state.group_by_id_mut(group_id) else {
            return Err(NetworkError::NotFound {
                name: group_id.to_owned(),
            });
        };
        if group.backend_rules().any(|existing| existing == rule) {
            return Err(NetworkError::RuleExists {
                group_id: group_id.to_owned(),
                rule: rule.to_string(),
            });
        }
        let added = SecurityGroupRule {
            id,
            rule: rule.clone(),
        };
        group.rules.push(added.clone());
        Ok(added)
    }

    fn delete(&self, group_id: &str) -> Result<(), NetworkError> {
        let mut state = self.lock();
        state.calls.push(NetworkCall::DeleteGroup(group_id.to_owned()));
        if let Some(err) = state.take_failure(NetworkOp::DeleteGroup) {
            return Err(err);
        }
        let before = state.groups.len();
        state.groups.retain(|_, group| group.id != group_id);
        if state.groups.len() == before {
            return Err(NetworkError::NotFound {
                name: group_id.to_owned(),
            });
        }
        Ok(())
    }
}

impl NetworkBackend for FakeNetwork {
    fn group_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> BackendFuture<'a, Option<SecurityGroup>, NetworkError> {
        Box::pin(future::ready(self.lookup(name)))
    }

    fn create_group<'a>(&'a self, name: &'a str) -> BackendFuture<'a, SecurityGroup, NetworkError> {
        Box::pin(future::ready(self.create(name)))
    }

    fn add_rule<'a>(
        &'a self,
        group_id: &'a str,
        rule: &'a BackendRule,
    ) -> BackendFuture<'a, SecurityGroupRule, NetworkError> {
        Box::pin(future::ready(self.add(group_id, rule)))
    }

    fn delete_group<'a>(&'a self, group_id: &'a str) -> BackendFuture<'a, (), NetworkError> {
        Box::pin(future::ready(self.delete(group_id)))
    }
}

/// Store path of the products document the fixture index points at.
pub const PRODUCT_METADATA_PATH: &str = "image-metadata/products.json";

/// Content id shared by the fixture index and products documents.
pub const FIXTURE_CONTENT_ID: &str = "com.ubuntu.cloud:released:openstack";

const INDEX_TEMPLATE: &str = r#"{
  "index": {
    "com.ubuntu.cloud:released:openstack": {
      "updated": "Wed, 01 May 2013 13:31:26 +0000",
      "clouds": [{"region": "{region}", "endpoint": "{url}"}],
      "cloudname": "test",
      "datatype": "image-ids",
      "format": "products:1.0",
      "products": [
        "com.ubuntu.cloud:server:16.04:amd64",
        "com.ubuntu.cloud:server:16.04:s390x",
        "com.ubuntu.cloud:server:14.04:s390x",
        "com.ubuntu.cloud:server:14.04:amd64",
        "com.ubuntu.cloud:server:14.04:arm64",
        "com.ubuntu.cloud:server:14.04:ppc64el",
        "com.ubuntu.cloud:server:12.10:amd64",
        "com.ubuntu.cloud:server:13.04:amd64"
      ],
      "path": "image-metadata/products.json"
    }
  },
  "updated": "Wed, 01 May 2013 13:31:26 +0000",
  "format": "index:1.0"
}"#;

/// Products document covering four architectures and four releases.
///
/// Trusty on amd64 in `some-region` is published twice: image `1` under
/// `20121218` and image `3` under `20121111`.
pub const PRODUCTS_DATA: &str = r#"{
  "content_id": "com.ubuntu.cloud:released:openstack",
  "format": "products:1.0",
  "updated": "Wed, 01 May 2013 13:31:26 +0000",
  "products": {
    "com.ubuntu.cloud:server:16.04:amd64": {
      "release": "trusty",
      "version": "16.04",
      "arch": "amd64",
      "versions": {
        "20121218": {
          "items": {
            "inst1": {"root_store": "ebs", "virt": "pv", "region": "some-region", "id": "1"},
            "inst2": {"root_store": "ebs", "virt": "pv", "region": "another-region", "id": "2"}
          },
          "pubname": "ubuntu-xenial-16.04-amd64-server-20121218",
          "label": "release"
        },
        "20121111": {
          "items": {
            "inst3": {"root_store": "ebs", "virt": "pv", "region": "some-region", "id": "3"}
          },
          "pubname": "ubuntu-xenial-16.04-amd64-server-20121111",
          "label": "release"
        }
      }
    },
    "com.ubuntu.cloud:server:14.04:amd64": {
      "release": "trusty",
      "version": "14.04",
      "arch": "amd64",
      "versions": {
        "20121218": {
          "items": {
            "inst1": {"root_store": "ebs", "virt": "pv", "region": "some-region", "id": "1"},
            "inst2": {"root_store": "ebs", "virt": "pv", "region": "another-region", "id": "2"}
          },
          "pubname": "ubuntu-trusty-14.04-amd64-server-20121218",
          "label": "release"
        },
        "20121111": {
          "items": {
            "inst3": {"root_store": "ebs", "virt": "pv", "region": "some-region", "id": "3"}
          },
          "pubname": "ubuntu-trusty-14.04-amd64-server-20121111",
          "label": "release"
        }
      }
    },
    "com.ubuntu.cloud:server:14.04:arm64": {
      "release": "trusty",
      "version": "14.04",
      "arch": "arm64",
      "versions": {
        "20121111": {
          "items": {
            "inst33": {"root_store": "ebs", "virt": "pv", "region": "some-region", "id": "33"}
          },
          "pubname": "ubuntu-trusty-14.04-arm64-server-20121111",
          "label": "release"
        }
      }
    },
    "com.ubuntu.cloud:server:14.04:ppc64el": {
      "release": "trusty",
      "version": "14.04",
      "arch": "ppc64el",
      "versions": {
        "20121111": {
          "items": {
            "inst33": {"root_store": "ebs", "virt": "pv", "region": "some-region", "id": "33"}
          },
          "pubname": "ubuntu-trusty-14.04-ppc64el-server-20121111",
          "label": "release"
        }
      }
    },
    "com.ubuntu.cloud:server:12.10:amd64": {
      "release": "quantal",
      "version": "12.10",
      "arch": "amd64",
      "versions": {
        "20121218": {
          "items": {
            "inst3": {"root_store": "ebs", "virt": "pv", "region": "region-1", "id": "id-1"},
            "inst4": {"root_store": "ebs", "virt": "pv", "region": "region-2", "id": "id-2"}
          },
          "pubname": "ubuntu-quantal-12.10-amd64-server-20121218",
          "label": "release"
        }
      }
    },
    "com.ubuntu.cloud:server:13.04:amd64": {
      "release": "raring",
      "version": "13.04",
      "arch": "amd64",
      "versions": {
        "20121218": {
          "items": {
            "inst5": {"root_store": "ebs", "virt": "pv", "region": "some-region", "id": "id-y"},
            "inst6": {"root_store": "ebs", "virt": "pv", "region": "another-region", "id": "id-z"}
          },
          "pubname": "ubuntu-raring-13.04-amd64-server-20121218",
          "label": "release"
        }
      }
    },
    "com.ubuntu.cloud:server:14.04:s390x": {
      "release": "trusty",
      "version": "14.04",
      "arch": "s390x",
      "versions": {
        "20121218": {
          "items": {
            "inst5": {"root_store": "ebs", "virt": "pv", "region": "some-region", "id": "id-y"},
            "inst6": {"root_store": "ebs", "virt": "pv", "region": "another-region", "id": "id-z"}
          },
          "pubname": "ubuntu-trusty-14.04-s390x-server-20121218",
          "label": "release"
        }
      }
    },
    "com.ubuntu.cloud:server:16.04:s390x": {
      "release": "xenial",
      "version": "16.04",
      "arch": "s390x",
      "versions": {
        "20121218": {
          "items": {
            "inst5": {"root_store": "ebs", "virt": "pv", "region": "some-region", "id": "id-y"},
            "inst6": {"root_store": "ebs", "virt": "pv", "region": "another-region", "id": "id-z"}
          },
          "pubname": "ubuntu-xenial-16.04-s390x-server-20121218",
          "label": "release"
        }
      }
    }
  }
}"#;

/// Renders the fixture index for one region and endpoint.
#[must_use]
pub fn index_document(region: &str, url: &str) -> String {
    INDEX_TEMPLATE
        .replace("{region}", region)
        .replace("{url}", url)
}

/// Publishes the fixture index and products documents into `store`.
///
/// # Errors
///
/// Propagates store write failures.
pub fn use_test_image_data(
    store: &dyn CatalogStore,
    region: &str,
    url: &str,
) -> Result<(), StoreError> {
    let index = index_document(region, url);
    store.put(
        &unsigned_index_path(DEFAULT_STREAM_VERSION, 1),
        index.as_bytes(),
        u64::try_from(index.len()).unwrap_or(u64::MAX),
    )?;
    store.put(
        PRODUCT_METADATA_PATH,
        PRODUCTS_DATA.as_bytes(),
        u64::try_from(PRODUCTS_DATA.len()).unwrap_or(u64::MAX),
    )
}

/// Removes every document from `store`.
///
/// # Errors
///
/// Propagates store failures.
pub fn remove_test_image_data(store: &dyn CatalogStore) -> Result<(), StoreError> {
    store.remove_all()
}

/// Instance type table in provider order.
///
/// `STARDUST1-S` is deprecated and `HVM1-S` only runs `hvm` images, so
/// neither fits the `pv` fixture images; no type runs `s390x` or `ppc64el`.
#[must_use]
pub fn sample_instance_types() -> Vec<InstanceType> {
    vec![
        InstanceType::new("STARDUST1-S", &["amd64"], 1, 1024, 4).deprecated(),
        InstanceType::new("HVM1-S", &["amd64"], 2, 2048, 8).with_virt_type("hvm"),
        InstanceType::new("DEV1-S", &["amd64"], 2, 2048, 10).with_root_disk(20_480),
        InstanceType::new("AMP2-C2", &["arm64"], 2, 8192, 12).with_root_disk(20_480),
        InstanceType::new("DEV1-M", &["amd64"], 3, 4096, 20).with_root_disk(40_960),
        InstanceType::new("DEV1-L", &["amd64"], 4, 8192, 40).with_root_disk(81_920),
        InstanceType::new("GP1-XS", &["amd64"], 4, 16_384, 80).with_root_disk(153_600),
    ]
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
