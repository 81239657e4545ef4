//! Monitor output helpers for XFRM events.
//!
//! Renders decoded events in text form (one stanza per event, in the style
//! of `ip xfrm monitor`) or as one JSON object per line.
//!
//! # Example
//!
//! ```ignore
//! use xfrmwatch::netlink::events::EventStream;
//! use xfrmwatch::output::{MonitorConfig, OutputFormat, print_event};
//! use tokio_stream::StreamExt;
//!
//! let config = MonitorConfig::new()
//!     .with_timestamp(true)
//!     .with_format(OutputFormat::Text);
//!
//! let mut stream = EventStream::builder().sa(true).policy(true).build()?;
//! let mut stdout = std::io::stdout();
//!
//! while let Some(event) = stream.try_next().await? {
//!     print_event(&mut stdout, &event, &config)?;
//! }
//! ```

use std::io::{self, Write};
use std::time::SystemTime;

use serde_json::json;

use super::{OutputFormat, OutputOptions};
use crate::netlink::events::XfrmEvent;
use crate::netlink::xfrm::{SaId, SaRecord, SpRecord, TrafficSelector, XfrmAddress};

/// Configuration for monitor output.
#[derive(Debug, Clone, Default)]
pub struct MonitorConfig {
    /// Whether to prefix output with timestamps.
    pub timestamp: bool,
    /// Output format (text or JSON).
    pub format: OutputFormat,
    /// Output options.
    pub opts: OutputOptions,
}

impl MonitorConfig {
    /// Create a new monitor config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable timestamp prefixes.
    pub fn with_timestamp(mut self, enabled: bool) -> Self {
        self.timestamp = enabled;
        self
    }

    /// Set the output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the output options.
    pub fn with_opts(mut self, opts: OutputOptions) -> Self {
        self.opts = opts;
        self
    }
}

/// Write a timestamp prefix to the output if enabled.
///
/// Format: `[seconds.milliseconds] `
pub fn write_timestamp<W: Write>(w: &mut W, config: &MonitorConfig) -> io::Result<()> {
    if config.timestamp {
        let now = SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        write!(w, "[{}.{:03}] ", now.as_secs(), now.subsec_millis())?;
    }
    Ok(())
}

/// Helper trait for event types that can be printed in monitor mode.
pub trait MonitorEvent {
    /// Print the event in text format.
    fn print_text<W: Write>(&self, w: &mut W, opts: &OutputOptions) -> io::Result<()>;

    /// Convert the event to a JSON value.
    fn to_json(&self) -> serde_json::Value;
}

/// Print a monitor event using the configured format.
pub fn print_event<W, E>(w: &mut W, event: &E, config: &MonitorConfig) -> io::Result<()>
where
    W: Write,
    E: MonitorEvent,
{
    write_timestamp(w, config)?;

    match config.format {
        OutputFormat::Text => {
            event.print_text(w, &config.opts)?;
        }
        OutputFormat::Json => {
            let json = event.to_json();
            let rendered = if config.opts.pretty {
                serde_json::to_string_pretty(&json)
            } else {
                serde_json::to_string(&json)
            };
            writeln!(w, "{}", rendered.unwrap_or_default())?;
        }
    }

    w.flush()?;
    Ok(())
}

/// Print a startup message for monitor mode (text format only).
pub fn print_monitor_start<W: Write>(
    w: &mut W,
    config: &MonitorConfig,
    message: &str,
) -> io::Result<()> {
    if config.format == OutputFormat::Text {
        writeln!(w, "{}", message)?;
    }
    Ok(())
}

/// Render a raw address for the given family, `?` when unconvertible.
fn fmt_addr(addr: &XfrmAddress, family: u16) -> String {
    match addr.to_ip(family) {
        Some(ip) => ip.to_string(),
        None => "?".to_string(),
    }
}

fn fmt_key(key: &[u8]) -> String {
    let mut s = String::with_capacity(2 + key.len() * 2);
    s.push_str("0x");
    for b in key {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

fn hex_key_json(key: &[u8]) -> serde_json::Value {
    json!(fmt_key(key))
}

fn write_selector<W: Write>(w: &mut W, sel: &TrafficSelector) -> io::Result<()> {
    write!(
        w,
        "\tsel src {}/{} dst {}/{}",
        fmt_addr(&sel.src, sel.family),
        sel.src_prefix_len,
        fmt_addr(&sel.dst, sel.family),
        sel.dst_prefix_len
    )?;
    if let Some(sport) = sel.src_port {
        write!(w, " sport {}", sport)?;
    }
    if let Some(dport) = sel.dst_port {
        write!(w, " dport {}", dport)?;
    }
    if sel.proto != 0 {
        write!(w, " proto {}", sel.proto)?;
    }
    writeln!(w)
}

fn selector_json(sel: &TrafficSelector) -> serde_json::Value {
    json!({
        "src": fmt_addr(&sel.src, sel.family),
        "src_prefixlen": sel.src_prefix_len,
        "dst": fmt_addr(&sel.dst, sel.family),
        "dst_prefixlen": sel.dst_prefix_len,
        "sport": sel.src_port,
        "dport": sel.dst_port,
        "proto": sel.proto,
    })
}

fn write_sa<W: Write>(w: &mut W, sa: &SaRecord, opts: &OutputOptions) -> io::Result<()> {
    writeln!(
        w,
        "\tsrc {} dst {}",
        fmt_addr(&sa.src, sa.family),
        fmt_addr(&sa.dst, sa.family)
    )?;
    writeln!(
        w,
        "\tproto {} spi 0x{:08x} reqid {} mode {}",
        sa.protocol, sa.spi, sa.reqid, sa.mode
    )?;
    write!(w, "\treplay-window {}", sa.replay_window)?;
    if let Some(thresh) = sa.replay_threshold {
        write!(w, " replay-thresh {}", thresh)?;
    }
    if sa.flags != 0 {
        write!(w, " flag 0x{:02x}", sa.flags)?;
    }
    writeln!(w)?;

    if let Some(ref auth) = sa.auth {
        write!(w, "\tauth-trunc {}", auth.name)?;
        if !opts.hide_keys {
            write!(w, " {}", fmt_key(&auth.key))?;
        }
        if auth.trunc_len != 0 {
            write!(w, " {}", auth.trunc_len)?;
        }
        writeln!(w)?;
    }
    if let Some(ref enc) = sa.enc {
        write!(w, "\tenc {}", enc.name)?;
        if !opts.hide_keys {
            write!(w, " {}", fmt_key(&enc.key))?;
        }
        writeln!(w)?;
    }
    if let Some(ref aead) = sa.aead {
        write!(w, "\taead {}", aead.name)?;
        if !opts.hide_keys {
            write!(w, " {}", fmt_key(&aead.key))?;
        }
        writeln!(w, " {}", aead.icv_len)?;
    }
    if let Some(ref comp) = sa.comp {
        writeln!(w, "\tcomp {}", comp.name)?;
    }
    if let Some(ref encap) = sa.encap {
        let sport = encap.encap_sport;
        let dport = encap.encap_dport;
        writeln!(
            w,
            "\tencap type {} sport {} dport {}",
            encap.encap_type,
            u16::from_be(sport),
            u16::from_be(dport)
        )?;
    }
    if let Some(if_id) = sa.if_id {
        writeln!(w, "\tif_id {}", if_id)?;
    }
    write_selector(w, &sa.selector)
}

fn sa_json(sa: &SaRecord) -> serde_json::Value {
    json!({
        "src": fmt_addr(&sa.src, sa.family),
        "dst": fmt_addr(&sa.dst, sa.family),
        "proto": sa.protocol.to_string(),
        "spi": format!("0x{:08x}", sa.spi),
        "reqid": sa.reqid,
        "mode": sa.mode.to_string(),
        "replay_window": sa.replay_window,
        "replay_thresh": sa.replay_threshold,
        "flags": sa.flags,
        "bytes": sa.bytes,
        "packets": sa.packets,
        "auth": sa.auth.as_ref().map(|a| json!({
            "name": a.name,
            "key": hex_key_json(&a.key),
            "key_len": a.key_len,
            "trunc_len": a.trunc_len,
        })),
        "enc": sa.enc.as_ref().map(|a| json!({
            "name": a.name,
            "key": hex_key_json(&a.key),
            "key_len": a.key_len,
        })),
        "aead": sa.aead.as_ref().map(|a| json!({
            "name": a.name,
            "key": hex_key_json(&a.key),
            "key_len": a.key_len,
            "icv_len": a.icv_len,
        })),
        "comp": sa.comp.as_ref().map(|a| json!(a.name)),
        "if_id": sa.if_id,
        "sel": selector_json(&sa.selector),
    })
}

fn write_sa_id<W: Write>(w: &mut W, id: &SaId) -> io::Result<()> {
    writeln!(
        w,
        "\tdst {} proto {} spi 0x{:08x}",
        fmt_addr(&id.dst, id.family),
        id.protocol,
        id.spi
    )
}

fn sa_id_json(id: &SaId) -> serde_json::Value {
    json!({
        "dst": fmt_addr(&id.dst, id.family),
        "proto": id.protocol.to_string(),
        "spi": format!("0x{:08x}", id.spi),
    })
}

fn write_policy<W: Write>(w: &mut W, policy: &SpRecord) -> io::Result<()> {
    writeln!(
        w,
        "\tdir {} action {} priority {} index {}",
        policy.direction, policy.action, policy.priority, policy.index
    )?;
    if let Some(if_id) = policy.if_id {
        write!(w, "\tif_id {}", if_id)?;
        writeln!(w)?;
    }
    write_selector(w, &policy.selector)?;
    for tmpl in &policy.templates {
        write!(w, "\ttmpl proto {} reqid {} mode {}", tmpl.protocol, tmpl.reqid, tmpl.mode)?;
        if tmpl.spi != 0 {
            write!(w, " spi 0x{:08x}", tmpl.spi)?;
        }
        if tmpl.optional {
            write!(w, " optional")?;
        }
        writeln!(w)?;
    }
    Ok(())
}

fn policy_json(policy: &SpRecord) -> serde_json::Value {
    json!({
        "dir": policy.direction.to_string(),
        "action": policy.action.to_string(),
        "priority": policy.priority,
        "index": policy.index,
        "if_id": policy.if_id,
        "sel": selector_json(&policy.selector),
        "tmpl": policy.templates.iter().map(|t| json!({
            "proto": t.protocol.to_string(),
            "mode": t.mode.to_string(),
            "reqid": t.reqid,
            "spi": format!("0x{:08x}", t.spi),
            "optional": t.optional,
        })).collect::<Vec<_>>(),
    })
}

impl MonitorEvent for XfrmEvent {
    fn print_text<W: Write>(&self, w: &mut W, opts: &OutputOptions) -> io::Result<()> {
        match self {
            XfrmEvent::NewSa(sa) => {
                writeln!(w, "SA new:")?;
                write_sa(w, sa, opts)
            }
            XfrmEvent::UpdSa(sa) => {
                writeln!(w, "SA update:")?;
                write_sa(w, sa, opts)
            }
            XfrmEvent::GetSa(sa) => {
                writeln!(w, "SA get:")?;
                write_sa(w, sa, opts)
            }
            XfrmEvent::DelSa { id, sa } => {
                writeln!(w, "SA delete:")?;
                match sa {
                    Some(sa) => write_sa(w, sa, opts),
                    None => write_sa_id(w, id),
                }
            }
            XfrmEvent::SaExpire { sa, hard } => {
                writeln!(w, "SA expire ({}):", if *hard { "hard" } else { "soft" })?;
                write_sa(w, sa, opts)
            }
            XfrmEvent::NewPolicy(policy) => {
                writeln!(w, "policy new:")?;
                write_policy(w, policy)
            }
            XfrmEvent::UpdPolicy(policy) => {
                writeln!(w, "policy update:")?;
                write_policy(w, policy)
            }
            XfrmEvent::GetPolicy(policy) => {
                writeln!(w, "policy get:")?;
                write_policy(w, policy)
            }
            XfrmEvent::DelPolicy { id, policy } => {
                writeln!(w, "policy delete:")?;
                match policy {
                    Some(policy) => write_policy(w, policy),
                    None => {
                        writeln!(w, "\tdir {} index {}", id.direction, id.index)?;
                        write_selector(w, &id.selector)
                    }
                }
            }
            XfrmEvent::FlushSa { protocol } => {
                writeln!(w, "SA flush: proto {}", protocol)
            }
            XfrmEvent::FlushPolicy => writeln!(w, "policy flush"),
            XfrmEvent::Unknown(msg_type) => {
                writeln!(w, "event type 0x{:02x} (not decoded)", msg_type)
            }
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            XfrmEvent::NewSa(sa) => json!({"event": "sa", "action": "new", "sa": sa_json(sa)}),
            XfrmEvent::UpdSa(sa) => json!({"event": "sa", "action": "upd", "sa": sa_json(sa)}),
            XfrmEvent::GetSa(sa) => json!({"event": "sa", "action": "get", "sa": sa_json(sa)}),
            XfrmEvent::DelSa { id, sa } => json!({
                "event": "sa",
                "action": "del",
                "id": sa_id_json(id),
                "sa": sa.as_ref().map(sa_json),
            }),
            XfrmEvent::SaExpire { sa, hard } => json!({
                "event": "sa",
                "action": "expire",
                "hard": hard,
                "sa": sa_json(sa),
            }),
            XfrmEvent::NewPolicy(p) => {
                json!({"event": "policy", "action": "new", "policy": policy_json(p)})
            }
            XfrmEvent::UpdPolicy(p) => {
                json!({"event": "policy", "action": "upd", "policy": policy_json(p)})
            }
            XfrmEvent::GetPolicy(p) => {
                json!({"event": "policy", "action": "get", "policy": policy_json(p)})
            }
            XfrmEvent::DelPolicy { id, policy } => json!({
                "event": "policy",
                "action": "del",
                "dir": id.direction.to_string(),
                "index": id.index,
                "policy": policy.as_ref().map(policy_json),
            }),
            XfrmEvent::FlushSa { protocol } => json!({
                "event": "sa",
                "action": "flush",
                "proto": protocol.to_string(),
            }),
            XfrmEvent::FlushPolicy => json!({"event": "policy", "action": "flush"}),
            XfrmEvent::Unknown(msg_type) => json!({
                "event": "unknown",
                "msg_type": msg_type,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::events::decode_event;
    use crate::netlink::fixtures::{encode_algo, push_attr, sample_sa_info, sample_sp_info};
    use crate::netlink::xfrm::msg;
    use zerocopy::IntoBytes;

    fn render_text(event: &XfrmEvent, opts: OutputOptions) -> String {
        let mut buf = Vec::new();
        event.print_text(&mut buf, &opts).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn sa_text_output() {
        let info = sample_sa_info();
        let mut payload = info.as_bytes().to_vec();
        push_attr(&mut payload, 2, &encode_algo("cbc(aes)", &[0xde, 0xad])); // XFRMA_ALG_CRYPT

        let event = decode_event(msg::XFRM_MSG_NEWSA, &payload).unwrap();
        let text = render_text(&event, OutputOptions::default());

        assert!(text.starts_with("SA new:"));
        assert!(text.contains("src 10.0.0.1 dst 10.0.0.2"));
        assert!(text.contains("proto esp spi 0x12345678 reqid 7 mode tunnel"));
        assert!(text.contains("replay-window 32"));
        assert!(text.contains("enc cbc(aes) 0xdead"));
        assert!(text.contains("sel src 10.0.0.1/32 dst 10.0.0.2/32"));
    }

    #[test]
    fn sa_text_hides_keys_on_request() {
        let info = sample_sa_info();
        let mut payload = info.as_bytes().to_vec();
        push_attr(&mut payload, 2, &encode_algo("cbc(aes)", &[0xde, 0xad]));

        let event = decode_event(msg::XFRM_MSG_NEWSA, &payload).unwrap();
        let text = render_text(
            &event,
            OutputOptions {
                hide_keys: true,
                ..Default::default()
            },
        );
        assert!(text.contains("enc cbc(aes)"));
        assert!(!text.contains("0xdead"));
    }

    #[test]
    fn sa_json_output() {
        let info = sample_sa_info();
        let event = decode_event(msg::XFRM_MSG_NEWSA, info.as_bytes()).unwrap();
        let json = event.to_json();

        assert_eq!(json["event"], "sa");
        assert_eq!(json["action"], "new");
        assert_eq!(json["sa"]["src"], "10.0.0.1");
        assert_eq!(json["sa"]["spi"], "0x12345678");
        assert_eq!(json["sa"]["mode"], "tunnel");
        assert!(json["sa"]["auth"].is_null());
    }

    #[test]
    fn policy_text_output() {
        let info = sample_sp_info();
        let event = decode_event(msg::XFRM_MSG_NEWPOLICY, info.as_bytes()).unwrap();
        let text = render_text(&event, OutputOptions::default());

        assert!(text.starts_with("policy new:"));
        assert!(text.contains("dir out action allow priority 2080 index 16"));
        assert!(text.contains("sel src 192.0.2.0/24 dst 198.51.100.0/24"));
    }

    #[test]
    fn flush_and_unknown_output() {
        let text = render_text(
            &XfrmEvent::FlushSa {
                protocol: crate::netlink::xfrm::IpsecProtocol::Esp,
            },
            OutputOptions::default(),
        );
        assert_eq!(text, "SA flush: proto esp\n");

        let text = render_text(&XfrmEvent::Unknown(0x17), OutputOptions::default());
        assert_eq!(text, "event type 0x17 (not decoded)\n");

        let json = XfrmEvent::FlushPolicy.to_json();
        assert_eq!(json["event"], "policy");
        assert_eq!(json["action"], "flush");
    }

    #[test]
    fn unconvertible_address_renders_placeholder() {
        let mut info = sample_sa_info();
        info.family = 99;
        let event = decode_event(msg::XFRM_MSG_NEWSA, info.as_bytes()).unwrap();
        let text = render_text(&event, OutputOptions::default());
        assert!(text.contains("src ? dst ?"));
    }

    #[test]
    fn timestamp_prefix() {
        let config = MonitorConfig::new().with_timestamp(true);
        let mut buf = Vec::new();
        write_timestamp(&mut buf, &config).unwrap();
        let s = String::from_utf8(buf).unwrap();
        assert!(s.starts_with('['));
        assert!(s.ends_with("] "));
    }

    #[test]
    fn print_event_json_line() {
        let config = MonitorConfig::new().with_format(OutputFormat::Json);
        let mut buf = Vec::new();
        print_event(&mut buf, &XfrmEvent::FlushPolicy, &config).unwrap();
        let s = String::from_utf8(buf).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(s.trim()).unwrap();
        assert_eq!(parsed["action"], "flush");
    }
}
