use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// The document served by a BBSim instance at `/v2/static`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SadisConfig {
    #[serde(deserialize_with = "nullable")]
    pub sadis: SubscriberEntries,
    #[serde(rename = "bandwidthprofile", deserialize_with = "nullable")]
    pub bandwidth_profile: BandwidthProfileEntries,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SubscriberEntries {
    #[serde(deserialize_with = "nullable")]
    pub integration: Integration,
    #[serde(deserialize_with = "nullable")]
    pub entries: Vec<SubscriberEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BandwidthProfileEntries {
    #[serde(deserialize_with = "nullable")]
    pub integration: Integration,
    #[serde(deserialize_with = "nullable")]
    pub entries: Vec<BandwidthProfile>,
}

/// Describes how ONOS is expected to reach the SADIS source. Decoded for logging only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Integration {
    #[serde(deserialize_with = "nullable")]
    pub url: String,
    #[serde(deserialize_with = "nullable")]
    pub cache: IntegrationCache,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IntegrationCache {
    #[serde(deserialize_with = "nullable")]
    pub enabled: bool,
    #[serde(rename = "maxsize", deserialize_with = "nullable")]
    pub max_size: i64,
    #[serde(deserialize_with = "nullable")]
    pub ttl: String,
}

/// A subscriber entry as it appears on the wire.
///
/// OLT and ONU identities share the same list and are only distinguished by which fields are
/// populated. Entries are converted into a [`Subscriber`] as soon as they are decoded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubscriberEntry {
    #[serde(deserialize_with = "nullable")]
    pub id: String,

    // OLT
    #[serde(deserialize_with = "nullable")]
    pub hardware_identifier: String,
    #[serde(deserialize_with = "nullable")]
    pub ip_address: String,
    #[serde(deserialize_with = "nullable")]
    pub nas_id: String,
    #[serde(deserialize_with = "nullable")]
    pub uplink_port: u32,
    pub nni_dhcp_trap_vid: Option<i32>,

    // ONU
    #[serde(deserialize_with = "nullable")]
    pub nas_port_id: String,
    #[serde(deserialize_with = "nullable")]
    pub circuit_id: String,
    #[serde(deserialize_with = "nullable")]
    pub remote_id: String,
    #[serde(deserialize_with = "nullable")]
    pub uni_tag_list: Vec<UniTag>,
}

/// A classified subscriber entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Subscriber {
    Olt(OltEntry),
    Onu(OnuEntry),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OltEntry {
    pub id: String,
    pub hardware_identifier: String,
    pub ip_address: String,
    pub nas_id: String,
    pub uplink_port: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nni_dhcp_trap_vid: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OnuEntry {
    pub id: String,
    pub nas_port_id: String,
    pub circuit_id: String,
    pub remote_id: String,
    pub uni_tag_list: Vec<UniTag>,
}

/// A service configured on an ONU's UNI port.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UniTag {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uni_tag_match: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pon_c_tag: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pon_s_tag: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technology_profile_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_bandwidth_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downstream_bandwidth_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_dhcp_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_igmp_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configured_mac_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub us_pon_c_tag_priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub us_pon_s_tag_priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ds_pon_c_tag_priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ds_pon_s_tag_priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

/// A bandwidth profile, with MEF (`air`/`ebs`/`eir`) or IETF (`gir`/`pir`/`pbs`) attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandwidthProfile {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub cbs: i64,
    #[serde(deserialize_with = "nullable")]
    pub cir: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub air: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ebs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eir: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gir: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pir: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pbs: Option<i64>,
}

/// A subscriber entry that is neither an OLT nor an ONU.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("entry {id:?} has neither a hardware identifier nor UNI tags")]
pub struct UnclassifiedEntry {
    pub id: String,
}

/// Decodes `null` like a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// === impl SadisConfig ===

impl SadisConfig {
    /// Splits the document into classified subscribers and bandwidth profiles.
    ///
    /// Subscribers are returned in document order; unclassifiable entries are returned as errors
    /// in their original position so callers can report them.
    pub fn into_parts(
        self,
    ) -> (
        Vec<Result<Subscriber, UnclassifiedEntry>>,
        Vec<BandwidthProfile>,
    ) {
        let subscribers = self
            .sadis
            .entries
            .into_iter()
            .map(Subscriber::try_from)
            .collect();
        (subscribers, self.bandwidth_profile.entries)
    }
}

// === impl Subscriber ===

impl Subscriber {
    pub fn id(&self) -> &str {
        match self {
            Self::Olt(olt) => &olt.id,
            Self::Onu(onu) => &onu.id,
        }
    }
}

/// An entry with a hardware identifier is an OLT, even if it also carries UNI tags. Otherwise an
/// entry with at least one UNI tag is an ONU.
impl TryFrom<SubscriberEntry> for Subscriber {
    type Error = UnclassifiedEntry;

    fn try_from(entry: SubscriberEntry) -> Result<Self, Self::Error> {
        let SubscriberEntry {
            id,
            hardware_identifier,
            ip_address,
            nas_id,
            uplink_port,
            nni_dhcp_trap_vid,
            nas_port_id,
            circuit_id,
            remote_id,
            uni_tag_list,
        } = entry;

        if !hardware_identifier.is_empty() {
            return Ok(Self::Olt(OltEntry {
                id,
                hardware_identifier,
                ip_address,
                nas_id,
                uplink_port,
                nni_dhcp_trap_vid,
            }));
        }

        if !uni_tag_list.is_empty() {
            return Ok(Self::Onu(OnuEntry {
                id,
                nas_port_id,
                circuit_id,
                remote_id,
                uni_tag_list,
            }));
        }

        Err(UnclassifiedEntry { id })
    }
}
