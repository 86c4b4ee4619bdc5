use crate::errors::ExporterError;

/// Abstract data types of RFC 7012, restricted to the ones that can be synthesized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Unsigned8,
    Unsigned16,
    Unsigned32,
    Unsigned64,
    Ipv4Address,
    DateTimeSeconds,
    DateTimeMilliseconds,
}

impl DataType {
    /// Encoded length in bytes (no reduced-size encoding)
    pub fn get_length(&self) -> u16 {
        match self {
            DataType::Unsigned8 => 1,
            DataType::Unsigned16 => 2,
            DataType::Unsigned32 | DataType::Ipv4Address | DataType::DateTimeSeconds => 4,
            DataType::Unsigned64 | DataType::DateTimeMilliseconds => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoElement {
    pub name: &'static str,
    pub element_id: u16,
    pub data_type: DataType,
}

impl InfoElement {
    pub fn get_length(&self) -> u16 {
        self.data_type.get_length()
    }
}

const fn ie(name: &'static str, element_id: u16, data_type: DataType) -> InfoElement {
    InfoElement {
        name,
        element_id,
        data_type,
    }
}

// https://www.iana.org/assignments/ipfix/ipfix.xhtml
static IANA_ELEMENTS: [InfoElement; 24] = [
    ie("octetDeltaCount", 1, DataType::Unsigned64),
    ie("packetDeltaCount", 2, DataType::Unsigned64),
    ie("protocolIdentifier", 4, DataType::Unsigned8),
    ie("ipClassOfService", 5, DataType::Unsigned8),
    ie("tcpControlBits", 6, DataType::Unsigned16),
    ie("sourceTransportPort", 7, DataType::Unsigned16),
    ie("sourceIPv4Address", 8, DataType::Ipv4Address),
    ie("sourceIPv4PrefixLength", 9, DataType::Unsigned8),
    ie("ingressInterface", 10, DataType::Unsigned32),
    ie("destinationTransportPort", 11, DataType::Unsigned16),
    ie("destinationIPv4Address", 12, DataType::Ipv4Address),
    ie("destinationIPv4PrefixLength", 13, DataType::Unsigned8),
    ie("egressInterface", 14, DataType::Unsigned32),
    ie("ipNextHopIPv4Address", 15, DataType::Ipv4Address),
    ie("bgpSourceAsNumber", 16, DataType::Unsigned32),
    ie("bgpDestinationAsNumber", 17, DataType::Unsigned32),
    ie("vlanId", 58, DataType::Unsigned16),
    ie("octetTotalCount", 85, DataType::Unsigned64),
    ie("packetTotalCount", 86, DataType::Unsigned64),
    ie("flowEndReason", 136, DataType::Unsigned8),
    ie("flowStartSeconds", 150, DataType::DateTimeSeconds),
    ie("flowEndSeconds", 151, DataType::DateTimeSeconds),
    ie("flowStartMilliseconds", 152, DataType::DateTimeMilliseconds),
    ie("flowEndMilliseconds", 153, DataType::DateTimeMilliseconds),
];

/// Find an IANA information element by its name
pub fn get_info_element(name: &str) -> Result<InfoElement, ExporterError> {
    IANA_ELEMENTS
        .iter()
        .find(|e| e.name == name)
        .copied()
        .ok_or_else(|| ExporterError::UnknownElement(name.to_string()))
}
