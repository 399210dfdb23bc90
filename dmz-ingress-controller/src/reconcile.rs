use std::collections::BTreeMap;

use dmz_whitelist::AddressSet;
use tracing::debug;

use crate::{MANAGED_ANNOTATION, PROVIDERS_ANNOTATION, WHITELIST_ANNOTATION};

/// Annotation values computed for one Ingress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconciliation {
    /// Full whitelist to enforce: managed ranges first, then the ranges
    /// someone else added.
    pub effective: AddressSet,
    /// Ranges contributed by the configured providers.
    pub managed: AddressSet,
    pub changed: bool,
}

impl Reconciliation {
    pub fn apply(&self, annotations: &mut BTreeMap<String, String>) {
        annotations.insert(WHITELIST_ANNOTATION.into(), self.effective.serialize());
        annotations.insert(MANAGED_ANNOTATION.into(), self.managed.serialize());
    }
}

/// Computes the whitelist annotations from the current annotations and the
/// provider ConfigMap data. Returns `None` for Ingresses without the
/// providers annotation.
///
/// Ranges in the current whitelist that were not written by the previous
/// pass (the managed annotation) are kept as they are. Only the managed
/// part is replaced by what the providers currently yield.
pub fn reconcile(
    annotations: &BTreeMap<String, String>,
    providers: &BTreeMap<String, String>,
) -> Option<Reconciliation> {
    let names = annotations.get(PROVIDERS_ANNOTATION)?;

    let current = AddressSet::parse(annotation(annotations, WHITELIST_ANNOTATION));
    let previous = AddressSet::parse(annotation(annotations, MANAGED_ANNOTATION));
    let external = current.difference(&previous);

    let managed = provider_whitelist(names, providers);
    let effective = managed.union(&external);
    let changed = effective != current || managed != previous;

    Some(Reconciliation {
        effective,
        managed,
        changed,
    })
}

/// Union of the address lists of every named provider, in the order the
/// names are listed. Names missing from `providers` are skipped.
pub fn provider_whitelist(names: &str, providers: &BTreeMap<String, String>) -> AddressSet {
    names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .fold(AddressSet::new(), |whitelist, name| {
            let Some(ranges) = providers.get(name) else {
                debug!("provider {} is not defined, skipping", name);
                return whitelist;
            };
            whitelist.union(&AddressSet::parse(ranges))
        })
}

fn annotation<'a>(annotations: &'a BTreeMap<String, String>, key: &str) -> &'a str {
    annotations.get(key).map(String::as_str).unwrap_or_default()
}
