//! Service Router - First-writer-wins service → index binding
//!
//! Every tag's service is owned by exactly one index for the lifetime of the
//! process. The first index to write a service claims it; later writes of the
//! same service through another index drop the offending tag.
//!
//! Lookups take a read lock. Only the first sighting of a service takes the
//! write lock, and it re-checks before binding so two racing writers agree
//! on a single owner.

use crate::index::{IndexError, IndexId, IndexResult, ParsedTag, TableOfContents};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of binding a service to an index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Service already belonged to the requested index
    Existing,
    /// Service was unbound and now belongs to the requested index
    Created,
}

/// A tag rejected individually, with the reason
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedTag {
    pub tag: String,
    pub error: IndexError,
}

/// Append-only routing table
#[derive(Debug)]
pub struct ServiceRouter {
    routes: RwLock<HashMap<String, IndexId>>,
    toc: Arc<TableOfContents>,
}

impl ServiceRouter {
    pub fn new(toc: Arc<TableOfContents>) -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            toc,
        }
    }

    /// Bind a built-in service at startup
    pub fn seed(&self, service: &str, index: IndexId) -> IndexResult<()> {
        self.toc.register_index(&index);
        self.bind(service, &index).map(|_| ())
    }

    /// Index a service is bound to, if any
    pub fn lookup(&self, service: &str) -> Option<IndexId> {
        self.routes.read().get(service).cloned()
    }

    /// Verify a service may be written through `index` without binding it
    pub fn check(&self, service: &str, index: &IndexId) -> IndexResult<()> {
        match self.routes.read().get(service) {
            Some(bound) if bound != index => Err(IndexError::ServiceConflict {
                service: service.to_string(),
                bound: bound.clone(),
                requested: index.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Bind an unbound service to `index`, or confirm an existing binding
    pub fn bind(&self, service: &str, index: &IndexId) -> IndexResult<Binding> {
        if let Some(bound) = self.routes.read().get(service) {
            return conflict_or(service, bound, index, Binding::Existing);
        }

        let mut routes = self.routes.write();
        if let Some(bound) = routes.get(service) {
            return conflict_or(service, bound, index, Binding::Existing);
        }

        self.toc.add_index_service_entry(index, service)?;
        routes.insert(service.to_string(), index.clone());
        tracing::info!(service = %service, index = %index, "Bound service to index");
        Ok(Binding::Created)
    }

    /// Parse raw tags and keep those whose service may be written to `index`
    ///
    /// Malformed tags and tags routed elsewhere are dropped individually
    /// with a warning.
    pub fn admit(&self, raw_tags: &[String], index: &IndexId) -> (Vec<ParsedTag>, Vec<DroppedTag>) {
        let mut accepted = Vec::with_capacity(raw_tags.len());
        let mut dropped = Vec::new();

        for raw in raw_tags {
            let checked = ParsedTag::parse(raw)
                .and_then(|tag| self.check(&tag.service, index).map(|_| tag));
            match checked {
                Ok(tag) => accepted.push(tag),
                Err(error) => {
                    tracing::warn!(tag = %raw, index = %index, error = %error, "Dropped tag");
                    dropped.push(DroppedTag {
                        tag: raw.clone(),
                        error,
                    });
                }
            }
        }

        (accepted, dropped)
    }

    /// Registered services, sorted
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.routes.read().keys().cloned().collect();
        services.sort();
        services
    }

    /// Copy of the whole routing table
    pub fn routes(&self) -> HashMap<String, IndexId> {
        self.routes.read().clone()
    }
}

fn conflict_or(
    service: &str,
    bound: &IndexId,
    requested: &IndexId,
    ok: Binding,
) -> IndexResult<Binding> {
    if bound == requested {
        Ok(ok)
    } else {
        Err(IndexError::ServiceConflict {
            service: service.to_string(),
            bound: bound.clone(),
            requested: requested.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_router() -> ServiceRouter {
        let toc = Arc::new(TableOfContents::new());
        toc.register_index(&IndexId::split("fqdn"));
        toc.register_index(&IndexId::split("cluster"));
        let router = ServiceRouter::new(toc);
        router.seed("custom", IndexId::Full).unwrap();
        router.seed("re", IndexId::Text).unwrap();
        router
    }

    #[test]
    fn test_seeded_services() {
        let router = create_test_router();
        assert_eq!(router.lookup("custom"), Some(IndexId::Full));
        assert_eq!(router.lookup("re"), Some(IndexId::Text));
        assert_eq!(router.lookup("servers"), None);
        assert_eq!(router.services(), vec!["custom", "re"]);
    }

    #[test]
    fn test_first_writer_wins() {
        let router = create_test_router();
        let fqdn = IndexId::split("fqdn");
        let cluster = IndexId::split("cluster");

        assert_eq!(router.bind("servers", &fqdn).unwrap(), Binding::Created);
        assert_eq!(router.bind("servers", &fqdn).unwrap(), Binding::Existing);

        let err = router.bind("servers", &cluster).unwrap_err();
        assert!(matches!(err, IndexError::ServiceConflict { .. }));
        assert_eq!(router.lookup("servers"), Some(fqdn));
    }

    #[test]
    fn test_check_does_not_bind() {
        let router = create_test_router();
        let fqdn = IndexId::split("fqdn");
        router.check("servers", &fqdn).unwrap();
        assert_eq!(router.lookup("servers"), None);
        assert!(router.check("custom", &fqdn).is_err());
    }

    #[test]
    fn test_admit_drops_individual_tags() {
        let router = create_test_router();
        let fqdn = IndexId::split("fqdn");
        let raw = vec![
            "servers-dc:us_west".to_string(),
            "custom-a:1".to_string(),
            "garbage".to_string(),
            "servers-status:live".to_string(),
        ];

        let (accepted, dropped) = router.admit(&raw, &fqdn);
        assert_eq!(accepted.len(), 2);
        assert_eq!(dropped.len(), 2);
        assert_eq!(dropped[0].tag, "custom-a:1");
        assert!(matches!(dropped[0].error, IndexError::ServiceConflict { .. }));
        assert!(matches!(dropped[1].error, IndexError::InvalidTag(_)));
    }

    #[test]
    fn test_concurrent_binding_has_single_owner() {
        let router = Arc::new(create_test_router());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let router = Arc::clone(&router);
                std::thread::spawn(move || {
                    let index = if i % 2 == 0 {
                        IndexId::split("fqdn")
                    } else {
                        IndexId::split("cluster")
                    };
                    router.bind("servers", &index).is_ok()
                })
            })
            .collect();

        // Every writer through the winning index succeeds, every other one fails
        let wins: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(router.lookup("servers").is_some());
        assert_eq!(wins.iter().filter(|w| **w).count(), 4);
    }
}
