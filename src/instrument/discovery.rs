//! Serial port enumeration.
//!
//! Luxmeters are recognized by the manufacturer string of their USB serial
//! bridge: Prolific for the CL-200A cable, FTDI for the UT382.

use crate::error::{AppResult, DaqError};
use log::{debug, info};
use serialport::SerialPortType;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortInfo {
    pub device: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    /// USB vendor and product id.
    pub usb_id: Option<(u16, u16)>,
}

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(info: serialport::SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                device: info.port_name,
                manufacturer: usb.manufacturer,
                product: usb.product,
                serial_number: usb.serial_number,
                usb_id: Some((usb.vid, usb.pid)),
            },
            _ => Self {
                device: info.port_name,
                manufacturer: None,
                product: None,
                serial_number: None,
                usb_id: None,
            },
        }
    }
}

/// Every serial port on the system, sorted by device name.
pub fn list_ports() -> AppResult<Vec<PortInfo>> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .map_err(|err| DaqError::Io(err.into()))?
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by(|a, b| a.device.cmp(&b.device));
    Ok(ports)
}

/// Devices whose manufacturer contains `keyword`.
pub fn filter_by_manufacturer(ports: &[PortInfo], keyword: &str) -> Vec<String> {
    ports
        .iter()
        .filter(|port| {
            port.manufacturer
                .as_deref()
                .is_some_and(|name| name.contains(keyword))
        })
        .map(|port| port.device.clone())
        .collect()
}

pub fn find_luxmeters(keyword: &str) -> AppResult<Vec<String>> {
    info!("Looking for luxmeters...");
    let found = filter_by_manufacturer(&list_ports()?, keyword);
    debug!("Found luxmeters: {:?}", found);
    Ok(found)
}
