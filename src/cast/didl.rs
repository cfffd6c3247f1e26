//! DIDL-Lite metadata sent along with `SetAVTransportURI`
//!
//! Renderers use it to label the item on screen and to decide whether they
//! can play the resource at all, so the `protocolInfo` MIME must be right.

use quick_xml::escape::escape;

/// UPnP class for a MIME type
pub fn upnp_class(mime_type: &str) -> &'static str {
    match mime_type.split('/').next().unwrap_or_default() {
        "video" => "object.item.videoItem",
        "image" => "object.item.imageItem",
        "audio" => "object.item.audioItem.musicTrack",
        _ => "object.item",
    }
}

/// `protocolInfo` advertising plain HTTP GET for `mime_type`
pub fn protocol_info(mime_type: &str) -> String {
    format!("http-get:*:{}:*", mime_type)
}

/// Build a one-item DIDL-Lite document
pub fn build_metadata(title: &str, url: &str, mime_type: &str, size: Option<u64>) -> String {
    let size_attr = size.map(|s| format!(" size=\"{}\"", s)).unwrap_or_default();

    format!(
        concat!(
            r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" "#,
            r#"xmlns:dc="http://purl.org/dc/elements/1.1/" "#,
            r#"xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">"#,
            r#"<item id="0" parentID="-1" restricted="1">"#,
            r#"<dc:title>{title}</dc:title>"#,
            r#"<upnp:class>{class}</upnp:class>"#,
            r#"<res protocolInfo="{protocol}"{size}>{url}</res>"#,
            r#"</item></DIDL-Lite>"#
        ),
        title = escape(title),
        class = upnp_class(mime_type),
        protocol = escape(protocol_info(mime_type).as_str()),
        size = size_attr,
        url = escape(url),
    )
}
