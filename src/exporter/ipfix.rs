use super::registry::{get_info_element, DataType, InfoElement};
use super::{FieldValue, ProtocolExporter, TemplateId};
use crate::errors::ExporterError;

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub const IPFIX_VERSION: u16 = 10;
pub const MESSAGE_HEADER_LEN: usize = 16;
pub const SET_HEADER_LEN: usize = 4;
/// Bytes of every message that are not record data
pub const MESSAGE_OVERHEAD: usize = MESSAGE_HEADER_LEN + SET_HEADER_LEN;
/// Largest UDP payload over IPv4 (65535 - 20 bytes of IP header - 8 bytes of UDP header)
pub const MAX_UDP_PAYLOAD: usize = 65507;

const TEMPLATE_SET_ID: u16 = 2;
const FIRST_TEMPLATE_ID: TemplateId = 256;

/// Parameters of an IPFIX session
#[derive(Debug, Clone)]
pub struct IpfixOptions {
    pub observation_domain_id: u32,
    /// Over UDP, the template is sent again once this delay has elapsed. With a zero delay, it
    /// precedes every data message.
    pub template_refresh: Duration,
}

impl Default for IpfixOptions {
    fn default() -> Self {
        IpfixOptions {
            observation_domain_id: 1,
            template_refresh: Duration::from_secs(600),
        }
    }
}

#[derive(Debug)]
struct Template {
    id: TemplateId,
    elements: Vec<InfoElement>,
}

impl Template {
    fn encode_set(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(4 + 4 * self.elements.len());
        body.extend_from_slice(&self.id.to_be_bytes());
        body.extend_from_slice(&(self.elements.len() as u16).to_be_bytes());
        for e in self.elements.iter() {
            body.extend_from_slice(&e.element_id.to_be_bytes());
            body.extend_from_slice(&e.get_length().to_be_bytes());
        }
        body
    }
}

/// An IPFIX (RFC 7011) exporting process sending to one collector over UDP, with a single
/// template.
#[derive(Debug)]
pub struct IpfixExporter {
    socket: Option<UdpSocket>,
    options: IpfixOptions,
    /// number of data records sent so far, modulo 2^32
    sequence_number: u32,
    template: Option<Template>,
    data_set: Vec<u8>,
    record_count: u32,
    last_template_sent: Option<Instant>,
}

impl IpfixExporter {
    pub fn connect(collector: SocketAddr, options: IpfixOptions) -> Result<Self, ExporterError> {
        let local: SocketAddr = if collector.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).map_err(ExporterError::Connect)?;
        socket.connect(collector).map_err(ExporterError::Connect)?;
        log::trace!("IPFIX session to {collector} opened");
        Ok(IpfixExporter {
            socket: Some(socket),
            options,
            sequence_number: 0,
            template: None,
            data_set: Vec::with_capacity(u16::MAX as usize),
            record_count: 0,
            last_template_sent: None,
        })
    }

    fn encode_message(&self, set_id: u16, body: &[u8]) -> Vec<u8> {
        let length = MESSAGE_OVERHEAD + body.len();
        let export_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        let mut message = Vec::with_capacity(length);
        message.extend_from_slice(&IPFIX_VERSION.to_be_bytes());
        message.extend_from_slice(&(length as u16).to_be_bytes());
        message.extend_from_slice(&export_time.to_be_bytes());
        message.extend_from_slice(&self.sequence_number.to_be_bytes());
        message.extend_from_slice(&self.options.observation_domain_id.to_be_bytes());
        message.extend_from_slice(&set_id.to_be_bytes());
        message.extend_from_slice(&((SET_HEADER_LEN + body.len()) as u16).to_be_bytes());
        message.extend_from_slice(body);
        message
    }

    fn send(&self, message: &[u8]) -> Result<usize, ExporterError> {
        self.socket
            .as_ref()
            .ok_or(ExporterError::Closed)?
            .send(message)
            .map_err(ExporterError::Send)
    }

    fn send_template(&mut self) -> Result<usize, ExporterError> {
        let body = match &self.template {
            Some(template) => template.encode_set(),
            None => return Ok(0),
        };
        let sent = self.send(&self.encode_message(TEMPLATE_SET_ID, &body))?;
        self.last_template_sent = Some(Instant::now());
        log::debug!("Sent template ({sent} bytes)");
        Ok(sent)
    }

    fn get_template(&self, template_id: TemplateId) -> Result<&Template, ExporterError> {
        self.template
            .as_ref()
            .filter(|t| t.id == template_id)
            .ok_or(ExporterError::UnknownTemplate(template_id))
    }

    fn template_refresh_due(&self) -> bool {
        self.last_template_sent
            .map_or(true, |t| t.elapsed() >= self.options.template_refresh)
    }
}

fn encode_value(
    buffer: &mut Vec<u8>,
    element: &InfoElement,
    value: &FieldValue,
) -> Result<(), ExporterError> {
    match (element.data_type, value) {
        (DataType::Ipv4Address, FieldValue::Ipv4(ip)) => buffer.extend_from_slice(&ip.octets()),
        (DataType::Unsigned8, FieldValue::U8(v)) => buffer.push(*v),
        (DataType::Unsigned16, FieldValue::U16(v)) => buffer.extend_from_slice(&v.to_be_bytes()),
        (DataType::Unsigned32 | DataType::DateTimeSeconds, FieldValue::U32(v)) => {
            buffer.extend_from_slice(&v.to_be_bytes())
        }
        (DataType::Unsigned64 | DataType::DateTimeMilliseconds, FieldValue::U64(v)) => {
            buffer.extend_from_slice(&v.to_be_bytes())
        }
        _ => {
            return Err(ExporterError::TypeMismatch {
                element: element.name,
                value: value.to_string(),
            })
        }
    }
    Ok(())
}

impl ProtocolExporter for IpfixExporter {
    fn register_template(&mut self, field_names: &[&str]) -> Result<TemplateId, ExporterError> {
        if self.template.is_some() {
            return Err(ExporterError::TemplateAlreadyRegistered);
        }
        let elements = field_names
            .iter()
            .map(|name| get_info_element(name))
            .collect::<Result<Vec<_>, _>>()?;
        self.template = Some(Template {
            id: FIRST_TEMPLATE_ID,
            elements,
        });
        if let Err(e) = self.send_template() {
            self.template = None;
            return Err(e);
        }
        Ok(FIRST_TEMPLATE_ID)
    }

    fn pending_message_size(&self, _template_id: TemplateId) -> usize {
        MESSAGE_OVERHEAD + self.data_set.len()
    }

    fn add_record(
        &mut self,
        template_id: TemplateId,
        values: &[FieldValue],
    ) -> Result<(), ExporterError> {
        let template = self
            .template
            .as_ref()
            .filter(|t| t.id == template_id)
            .ok_or(ExporterError::UnknownTemplate(template_id))?;
        if template.elements.len() != values.len() {
            return Err(ExporterError::FieldCount {
                expected: template.elements.len(),
                got: values.len(),
            });
        }
        let start = self.data_set.len();
        for (element, value) in template.elements.iter().zip(values) {
            if let Err(e) = encode_value(&mut self.data_set, element, value) {
                // never keep a partial record
                self.data_set.truncate(start);
                return Err(e);
            }
        }
        self.record_count += 1;
        Ok(())
    }

    fn flush(&mut self, template_id: TemplateId) -> Result<usize, ExporterError> {
        self.get_template(template_id)?;
        if self.record_count == 0 {
            return Ok(0);
        }
        let data_set = std::mem::take(&mut self.data_set);
        let record_count = std::mem::take(&mut self.record_count);

        let mut sent = 0;
        if self.template_refresh_due() {
            sent += self.send_template()?;
        }
        let message = self.encode_message(template_id, &data_set);
        sent += self.send(&message)?;
        self.sequence_number = self.sequence_number.wrapping_add(record_count);

        // keep the allocation for the next set
        self.data_set = data_set;
        self.data_set.clear();
        Ok(sent)
    }

    fn close(&mut self) -> Result<(), ExporterError> {
        match self.socket.take() {
            Some(_) => {
                log::trace!("IPFIX session closed");
                Ok(())
            }
            None => Err(ExporterError::Closed),
        }
    }
}
