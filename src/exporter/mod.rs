use crate::errors::ExporterError;
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;

/// IANA information elements
pub mod registry;

/// IPFIX over UDP
pub mod ipfix;

pub use ipfix::IpfixExporter;

/// Identifier of a registered template. IPFIX data set ids start at 256.
pub type TemplateId = u16;

/// A value of a record field, ordered to match the template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Ipv4(Ipv4Addr),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Ipv4(ip) => write!(f, "{ip}"),
            FieldValue::U8(v) => write!(f, "{v}u8"),
            FieldValue::U16(v) => write!(f, "{v}u16"),
            FieldValue::U32(v) => write!(f, "{v}u32"),
            FieldValue::U64(v) => write!(f, "{v}u64"),
        }
    }
}

/// A session with a flow collector. It encodes records into messages and sends them.
///
/// One session is owned by exactly one export worker, which guarantees the call order:
/// `register_template` once, then any number of `add_record`/`flush`, then `close` once.
pub trait ProtocolExporter: std::marker::Send + 'static {
    /// Register the ordered list of fields of the records that will be sent. The template is
    /// usable as soon as this returns.
    fn register_template(&mut self, field_names: &[&str]) -> Result<TemplateId, ExporterError>;

    /// Size in bytes of the message that a flush would send now, framing included
    fn pending_message_size(&self, template_id: TemplateId) -> usize;

    /// Append one record to the pending set of that template
    fn add_record(
        &mut self,
        template_id: TemplateId,
        values: &[FieldValue],
    ) -> Result<(), ExporterError>;

    /// Send the pending set as one message and reset it. Nothing is sent if the set is empty.
    /// On error, the set is dropped.
    fn flush(&mut self, template_id: TemplateId) -> Result<usize, ExporterError>;

    /// Release the connection to the collector
    fn close(&mut self) -> Result<(), ExporterError>;
}
