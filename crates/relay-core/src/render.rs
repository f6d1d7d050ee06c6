//! Wire-format rendering of notifications and usage records.
//!
//! Two target formats exist: the CUF usage `<event>` document, built from a
//! normalized `UsageRecord`, and an Atom `<entry>` that wraps either the raw
//! notification JSON or a CUF document for publishing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{CoreError, Result},
    models::{Notification, UsageAttributes, UsageRecord},
    window::format_timestamp,
    xml::Element,
};

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const CUF_EVENT_NS: &str = "http://docs.rackspace.com/core/event";
const CUF_GLANCE_NS: &str = "http://docs.rackspace.com/event/glance";
const CUF_NOVA_NS: &str = "http://docs.rackspace.com/event/nova";

/// Wire format a handler publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TargetFormat {
    /// Atom entry carrying the notification JSON.
    #[default]
    #[serde(rename = "atom")]
    AtomEntry,
    /// CUF usage documents, one per record.
    #[serde(rename = "cuf")]
    CufUsageXml,
}

/// Deployment values the renderer stamps into documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Region code, required for CUF documents.
    pub region: Option<String>,
    /// Data center code, required for CUF documents.
    pub data_center: Option<String>,
    /// Emit `<link rel="related">` elements on Atom entries.
    pub entity_links: bool,
    /// Base URL the related links are built on.
    pub entity_links_base: String,
}

/// Something the renderer can turn into a document.
#[derive(Debug, Clone, Copy)]
pub enum RenderItem<'a> {
    /// A notification envelope published under `event_type`.
    Envelope {
        /// Notification embedded as the entry content.
        notification: &'a Notification,
        /// Event type the entry is published under.
        event_type: &'a str,
    },
    /// A usage record normalized from `notification`.
    Record {
        /// Source of the entry id and related links.
        notification: &'a Notification,
        /// Event type the entry is published under.
        event_type: &'a str,
        /// Record rendered as the CUF event.
        record: &'a UsageRecord,
    },
}

/// Renders one item in the requested format.
///
/// `AtomEntry` accepts both items: an envelope becomes a JSON entry and a
/// record becomes an entry wrapping its CUF document. `CufUsageXml` accepts
/// records only.
///
/// # Errors
///
/// Returns `CoreError::Render` when region or data center are missing for a
/// CUF document, or when an envelope is requested as CUF.
pub fn render(item: RenderItem<'_>, format: TargetFormat, options: &RenderOptions) -> Result<String> {
    match (item, format) {
        (RenderItem::Envelope { notification, event_type }, TargetFormat::AtomEntry) => {
            let json = serde_json::to_string(notification.body())
                .map_err(|e| CoreError::Render(format!("notification body: {e}")))?;
            let content = Element::new("content").attr("type", "application/json").text(json);
            Ok(atom_entry(notification, event_type, content, options).to_xml())
        },
        (RenderItem::Record { notification, event_type, record }, TargetFormat::AtomEntry) => {
            let content =
                Element::new("content").attr("type", "application/xml").raw(render_cuf(record, options)?);
            Ok(atom_entry(notification, event_type, content, options).to_xml())
        },
        (RenderItem::Record { record, .. }, TargetFormat::CufUsageXml) => render_cuf(record, options),
        (RenderItem::Envelope { event_type, .. }, TargetFormat::CufUsageXml) => Err(CoreError::Render(
            format!("{event_type} envelope has no CUF form without a usage record"),
        )),
    }
}

/// Renders a usage record as a CUF `<event>` document.
///
/// # Errors
///
/// Returns `CoreError::Render` when region or data center are not configured.
pub fn render_cuf(record: &UsageRecord, options: &RenderOptions) -> Result<String> {
    let region = required_option(options.region.as_deref(), "region")?;
    let data_center = required_option(options.data_center.as_deref(), "data_center")?;

    let (prefix, namespace, product) = match &record.attributes {
        UsageAttributes::Image { storage, server_id, server_name } => (
            "glance",
            CUF_GLANCE_NS,
            Element::new("glance:product")
                .attr("version", "1")
                .attr("serviceCode", "Glance")
                .attr("resourceType", record.resource_type.as_str())
                .attr("storage", storage.as_str())
                .attr("serverId", server_id.as_str())
                .attr("serverName", server_name.as_str()),
        ),
        UsageAttributes::Compute {
            flavor_name,
            bandwidth_in,
            bandwidth_out,
            options: product_options,
        } => (
            "nova",
            CUF_NOVA_NS,
            Element::new("nova:product")
                .attr("version", "1")
                .attr("serviceCode", "CloudServersOpenStack")
                .attr("resourceType", "SERVER")
                .attr("flavorId", record.resource_type.as_str())
                .attr("flavorName", flavor_name.as_str())
                .attr("status", record.status.map(|s| s.as_str()).unwrap_or_default())
                .attrs(product_options.attributes())
                .attr("bandwidthIn", bandwidth_in.to_string())
                .attr("bandwidthOut", bandwidth_out.to_string()),
        ),
    };

    let event = Element::new("event")
        .attr("xmlns", CUF_EVENT_NS)
        .attr(format!("xmlns:{prefix}"), namespace)
        .attr("version", "1")
        .attr("tenantId", record.tenant_id.as_str())
        .attr("id", record.record_id.to_string())
        .attr("resourceId", record.resource_id.as_str())
        .attr("type", "USAGE")
        .attr("dataCenter", data_center)
        .attr("region", region)
        .attr("startTime", format_timestamp(&record.start_time()))
        .attr("endTime", format_timestamp(&record.end_time()))
        .child(product);

    Ok(event.to_xml())
}

fn required_option<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CoreError::Render(format!("{name} must be configured for CUF documents")))
}

fn atom_entry(
    notification: &Notification,
    event_type: &str,
    content: Element,
    options: &RenderOptions,
) -> Element {
    let mut entry = Element::new("entry")
        .attr("xmlns", ATOM_NS)
        .child(Element::new("id").text(notification.message_id().to_string()))
        .child(Element::new("category").attr("term", event_type))
        .child(Element::new("title").attr("type", "text").text(event_type));

    if options.entity_links {
        for link in related_links(notification, &options.entity_links_base) {
            entry = entry.child(link);
        }
    }

    entry.child(content)
}

/// Related-entity links for the tenant and resource ids in the payload.
fn related_links(notification: &Notification, base: &str) -> Vec<Element> {
    let Ok(payload) = notification.payload() else {
        return Vec::new();
    };
    let base = base.trim_end_matches('/');

    [("tenant_id", "tenant"), ("owner", "tenant"), ("instance_id", "instance")]
        .into_iter()
        .filter_map(|(key, kind)| {
            let id = match payload.get(key)? {
                Value::String(id) if !id.is_empty() => id.clone(),
                Value::Number(id) => id.to_string(),
                _ => return None,
            };
            Some(
                Element::new("link")
                    .attr("rel", "related")
                    .attr("title", kind)
                    .attr("href", format!("{base}/{kind}/{id}")),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::normalize::Normalizer;

    fn options() -> RenderOptions {
        RenderOptions {
            region: Some("DFW".into()),
            data_center: Some("DFW1".into()),
            entity_links: false,
            entity_links_base: "http://usage.example.com/".into(),
        }
    }

    fn compute_notification() -> Notification {
        Notification::from_json(&json!({
            "event_type": "compute.instance.exists",
            "message_id": "some_uuid",
            "payload": {
                "tenant_id": "2882",
                "instance_id": "56",
                "instance_type_id": "10",
                "instance_type": "512MB Standard Instance",
                "audit_period_beginning": "2012-09-15 10:51:11",
                "audit_period_ending": "2012-09-16 10:51:11",
                "launched_at": "2012-09-15 11:51:11",
                "deleted_at": "",
                "state": "active",
                "state_description": "",
                "bandwidth": {"public": {"bw_in": 1001, "bw_out": 19992}},
                "image_meta": {"com.rackspace__1__options": "1"}
            }
        }))
        .unwrap()
    }

    #[test]
    fn renders_nova_cuf_document() {
        let notification = compute_notification();
        let record = Normalizer::default().normalize(&notification).unwrap().remove(0);

        let xml = render_cuf(&record, &options()).unwrap();
        let expected = format!(
            "<event xmlns=\"http://docs.rackspace.com/core/event\" \
             xmlns:nova=\"http://docs.rackspace.com/event/nova\" version=\"1\" \
             tenantId=\"2882\" id=\"{}\" resourceId=\"56\" type=\"USAGE\" \
             dataCenter=\"DFW1\" region=\"DFW\" startTime=\"2012-09-15 11:51:11\" \
             endTime=\"2012-09-16 10:51:11\"><nova:product version=\"1\" \
             serviceCode=\"CloudServersOpenStack\" resourceType=\"SERVER\" \
             flavorId=\"10\" flavorName=\"512MB Standard Instance\" status=\"ACTIVE\" \
             isRedHat=\"true\" bandwidthIn=\"1001\" bandwidthOut=\"19992\"/></event>",
            record.record_id
        );
        assert_eq!(xml, expected);
    }

    #[test]
    fn cuf_requires_region_and_data_center() {
        let notification = compute_notification();
        let record = Normalizer::default().normalize(&notification).unwrap().remove(0);

        let mut missing = options();
        missing.data_center = None;
        assert!(matches!(render_cuf(&record, &missing), Err(CoreError::Render(_))));
    }

    #[test]
    fn atom_entry_wraps_notification_json() {
        let notification = Notification::from_json(&json!({
            "event_type": "instance_create",
            "message_id": 1,
            "content": {"a": 3}
        }))
        .unwrap();

        let xml = render(
            RenderItem::Envelope { notification: &notification, event_type: "instance_create" },
            TargetFormat::AtomEntry,
            &options(),
        )
        .unwrap();

        assert!(xml.starts_with("<entry xmlns=\"http://www.w3.org/2005/Atom\"><id>1</id>"));
        assert!(xml.contains("<category term=\"instance_create\"/>"));
        assert!(xml.contains("<content type=\"application/json\">"));
        assert!(xml.contains("\"content\":{\"a\":3}"));
        assert!(!xml.contains("rel=\"related\""));
    }

    #[test]
    fn atom_entry_embeds_entity_links() {
        let notification = compute_notification();
        let mut with_links = options();
        with_links.entity_links = true;

        let xml = render(
            RenderItem::Envelope {
                notification: &notification,
                event_type: "compute.instance.exists.verified",
            },
            TargetFormat::AtomEntry,
            &with_links,
        )
        .unwrap();

        assert!(xml.contains("<category term=\"compute.instance.exists.verified\"/>"));
        assert!(xml.contains(
            "<link rel=\"related\" title=\"tenant\" href=\"http://usage.example.com/tenant/2882\"/>"
        ));
        assert!(xml.contains(
            "<link rel=\"related\" title=\"instance\" href=\"http://usage.example.com/instance/56\"/>"
        ));
    }

    #[test]
    fn atom_entry_wraps_cuf_record() {
        let notification = compute_notification();
        let record = Normalizer::default().normalize(&notification).unwrap().remove(0);

        let xml = render(
            RenderItem::Record {
                notification: &notification,
                event_type: "compute.instance.exists",
                record: &record,
            },
            TargetFormat::AtomEntry,
            &options(),
        )
        .unwrap();

        assert!(xml.contains("<content type=\"application/xml\"><event xmlns="));
        assert!(xml.ends_with("</event></content></entry>"));
    }

    #[test]
    fn envelope_has_no_cuf_form() {
        let notification = compute_notification();
        let result = render(
            RenderItem::Envelope { notification: &notification, event_type: "x" },
            TargetFormat::CufUsageXml,
            &options(),
        );
        assert!(matches!(result, Err(CoreError::Render(_))));
    }
}
