use crate::sadis::{BandwidthProfile, OltEntry, OnuEntry, Subscriber};
use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::trace;

/// Caches the entries fetched from all BBSim instances.
///
/// OLTs, ONUs, and bandwidth profiles are kept in independent tables, so the same ID may exist
/// once per kind. Entries are stored as immutable snapshots: an update for an ID replaces the
/// previous value as a whole, and readers only ever observe complete values.
///
/// Entries are never removed.
#[derive(Clone, Debug, Default)]
pub struct Store {
    olts: Table<OltEntry>,
    onus: Table<OnuEntry>,
    profiles: Table<BandwidthProfile>,
}

type Table<T> = Arc<RwLock<HashMap<String, Arc<T>>>>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Olt,
    Onu,
    BandwidthProfile,
}

/// A stored entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entity {
    Olt(Arc<OltEntry>),
    Onu(Arc<OnuEntry>),
    BandwidthProfile(Arc<BandwidthProfile>),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind} {id} not found in store")]
pub struct NotFound {
    pub kind: Kind,
    pub id: String,
}

// === impl Store ===

impl Store {
    /// Inserts the entity, replacing any previous entity of the same kind with the same ID.
    pub fn upsert(&self, entity: impl Into<Entity>) {
        match entity.into() {
            Entity::Olt(olt) => insert(&self.olts, olt.id.clone(), olt),
            Entity::Onu(onu) => insert(&self.onus, onu.id.clone(), onu),
            Entity::BandwidthProfile(bp) => insert(&self.profiles, bp.id.clone(), bp),
        }
    }

    pub fn lookup(&self, kind: Kind, id: &str) -> Result<Entity, NotFound> {
        trace!(%kind, %id, "Looking up");
        let entity = match kind {
            Kind::Olt => self.olts.read().get(id).cloned().map(Entity::Olt),
            Kind::Onu => self.onus.read().get(id).cloned().map(Entity::Onu),
            Kind::BandwidthProfile => self
                .profiles
                .read()
                .get(id)
                .cloned()
                .map(Entity::BandwidthProfile),
        };
        entity.ok_or_else(|| NotFound {
            kind,
            id: id.to_string(),
        })
    }

    /// Returns the number of entries of the given kind.
    pub fn len(&self, kind: Kind) -> usize {
        match kind {
            Kind::Olt => self.olts.read().len(),
            Kind::Onu => self.onus.read().len(),
            Kind::BandwidthProfile => self.profiles.read().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        [Kind::Olt, Kind::Onu, Kind::BandwidthProfile]
            .into_iter()
            .all(|kind| self.len(kind) == 0)
    }
}

fn insert<T: fmt::Debug>(table: &Table<T>, id: String, value: Arc<T>) {
    trace!(?value, "Storing");
    table.write().insert(id, value);
}

// === impl Kind ===

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Olt => "olt",
            Self::Onu => "onu",
            Self::BandwidthProfile => "bandwidthprofile",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

// === impl Entity ===

impl Entity {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Olt(_) => Kind::Olt,
            Self::Onu(_) => Kind::Onu,
            Self::BandwidthProfile(_) => Kind::BandwidthProfile,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Olt(olt) => &olt.id,
            Self::Onu(onu) => &onu.id,
            Self::BandwidthProfile(bp) => &bp.id,
        }
    }
}

/// Entities serialize as the bare entry, without a kind discriminant.
impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Olt(olt) => (**olt).serialize(s),
            Self::Onu(onu) => (**onu).serialize(s),
            Self::BandwidthProfile(bp) => (**bp).serialize(s),
        }
    }
}

impl From<OltEntry> for Entity {
    fn from(olt: OltEntry) -> Self {
        Self::Olt(Arc::new(olt))
    }
}

impl From<OnuEntry> for Entity {
    fn from(onu: OnuEntry) -> Self {
        Self::Onu(Arc::new(onu))
    }
}

impl From<BandwidthProfile> for Entity {
    fn from(bp: BandwidthProfile) -> Self {
        Self::BandwidthProfile(Arc::new(bp))
    }
}

impl From<Subscriber> for Entity {
    fn from(sub: Subscriber) -> Self {
        match sub {
            Subscriber::Olt(olt) => olt.into(),
            Subscriber::Onu(onu) => onu.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sadis::UniTag;

    fn mk_olt(id: &str, hw: &str) -> OltEntry {
        OltEntry {
            id: id.to_string(),
            hardware_identifier: hw.to_string(),
            ip_address: "10.0.0.1".to_string(),
            nas_id: "nas1".to_string(),
            uplink_port: 1,
            nni_dhcp_trap_vid: None,
        }
    }

    fn mk_onu(id: &str) -> OnuEntry {
        OnuEntry {
            id: id.to_string(),
            nas_port_id: "p1".to_string(),
            uni_tag_list: vec![UniTag {
                service_name: Some("data".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn lookup_returns_upserted_entity() {
        let store = Store::default();
        let bp = BandwidthProfile {
            id: "test-bp".to_string(),
            air: Some(20),
            ..Default::default()
        };
        store.upsert(bp.clone());

        let loaded = store
            .lookup(Kind::BandwidthProfile, "test-bp")
            .expect("profile must be stored");
        assert_eq!(loaded, Entity::from(bp));
        assert_eq!(loaded.kind(), Kind::BandwidthProfile);
        assert_eq!(loaded.id(), "test-bp");
    }

    #[test]
    fn lookup_of_unknown_id_is_not_found() {
        let store = Store::default();
        assert!(store.is_empty());
        assert_eq!(
            store.lookup(Kind::Olt, "missing"),
            Err(NotFound {
                kind: Kind::Olt,
                id: "missing".to_string()
            })
        );
    }

    #[test]
    fn upsert_replaces_whole_entity() {
        let store = Store::default();
        store.upsert(mk_olt("olt-0", "00:00:00:00:00:01"));

        let mut replacement = mk_olt("olt-0", "00:00:00:00:00:02");
        replacement.ip_address = String::new();
        store.upsert(replacement.clone());

        assert_eq!(store.len(Kind::Olt), 1);
        assert_eq!(
            store.lookup(Kind::Olt, "olt-0"),
            Ok(Entity::from(replacement))
        );
    }

    #[test]
    fn kinds_are_independent() {
        let store = Store::default();
        store.upsert(mk_olt("shared", "00:00:00:00:00:01"));
        store.upsert(mk_onu("shared"));
        store.upsert(mk_onu("onu-only"));

        assert!(matches!(
            store.lookup(Kind::Olt, "shared"),
            Ok(Entity::Olt(_))
        ));
        assert!(matches!(
            store.lookup(Kind::Onu, "shared"),
            Ok(Entity::Onu(_))
        ));
        assert!(store.lookup(Kind::Olt, "onu-only").is_err());
        assert!(store.lookup(Kind::BandwidthProfile, "shared").is_err());
        assert_eq!(store.len(Kind::Olt), 1);
        assert_eq!(store.len(Kind::Onu), 2);
        assert_eq!(store.len(Kind::BandwidthProfile), 0);
    }

    #[test]
    fn clones_share_tables() {
        let store = Store::default();
        let writer = store.clone();
        writer.upsert(Subscriber::Onu(mk_onu("onu-0")));
        assert!(store.lookup(Kind::Onu, "onu-0").is_ok());
    }

    #[test]
    fn concurrent_writers_and_readers() {
        let store = Store::default();
        let writers = (0..4)
            .map(|w| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        store.upsert(BandwidthProfile {
                            id: format!("bp-{i}"),
                            cbs: w,
                            cir: w,
                            ..Default::default()
                        });
                    }
                })
            })
            .collect::<Vec<_>>();
        let reader = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    if let Ok(Entity::BandwidthProfile(bp)) =
                        store.lookup(Kind::BandwidthProfile, &format!("bp-{i}"))
                    {
                        // A snapshot is never a mix of two writes.
                        assert_eq!(bp.cbs, bp.cir);
                    }
                }
            })
        };
        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();
        assert_eq!(store.len(Kind::BandwidthProfile), 100);
    }

    #[test]
    fn serializes_without_discriminant() {
        let entity = Entity::from(mk_olt("OLT1", "00:11:22:33:44:55"));
        assert_eq!(
            serde_json::to_value(&entity).unwrap(),
            serde_json::json!({
                "id": "OLT1",
                "hardwareIdentifier": "00:11:22:33:44:55",
                "ipAddress": "10.0.0.1",
                "nasId": "nas1",
                "uplinkPort": 1,
            })
        );
    }
}
