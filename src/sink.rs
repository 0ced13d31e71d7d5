// Sink Module - Frame preparation and transports to the LED tree (OPC or DDP)
use anyhow::{anyhow, Context, Result};
use ddp_rs::connection::DDPConnection;
use ddp_rs::protocol::{PixelConfig, ID};
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use crate::config::{AppConfig, SinkKind};
use crate::types::{Rgb, LED_COUNT};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

const DDP_PORT: u16 = 4048;

/// Destination for rendered frames
pub trait PixelSink: Send {
    /// Send `LED_COUNT` pixels already in wire order (3 bytes each)
    fn write_bytes(&mut self, data: &[u8]) -> Result<()>;

    fn write_frame(&mut self, pixels: &[Rgb]) -> Result<()> {
        self.write_bytes(&prepare_frame(pixels))
    }

    fn blank(&mut self) -> Result<()> {
        self.write_frame(&[Rgb::BLACK; LED_COUNT])
    }
}

/// Fit a frame to `LED_COUNT` (pad with black, truncate extras) and reorder RGB -> GRB
pub fn prepare_frame(pixels: &[Rgb]) -> Vec<u8> {
    let mut data = Vec::with_capacity(LED_COUNT * 3);
    for i in 0..LED_COUNT {
        let p = pixels.get(i).copied().unwrap_or(Rgb::BLACK);
        data.extend_from_slice(&[p.g, p.r, p.b]);
    }
    data
}

/// Open Pixel Control header for a set-pixel-colors message
pub fn opc_header(channel: u8, data_len: usize) -> [u8; 4] {
    let len = data_len.min(u16::MAX as usize) as u16;
    let [hi, lo] = len.to_be_bytes();
    [channel, 0x00, hi, lo]
}

/// FadeCandy / fcserver over TCP
pub struct OpcSink {
    stream: TcpStream,
    address: String,
}

impl OpcSink {
    pub fn connect(address: &str) -> Result<Self> {
        let addr = address
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve OPC server {}", address))?
            .next()
            .ok_or_else(|| anyhow!("OPC server {} resolved to no addresses", address))?;
        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .with_context(|| format!("Failed to connect to OPC server {}", address))?;
        stream.set_nodelay(true)?;
        Ok(OpcSink { stream, address: address.to_string() })
    }
}

impl PixelSink for OpcSink {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        let mut message = Vec::with_capacity(4 + data.len());
        message.extend_from_slice(&opc_header(0, data.len()));
        message.extend_from_slice(data);
        self.stream
            .write_all(&message)
            .with_context(|| format!("Failed to send frame to {}", self.address))
    }
}

/// WLED device over DDP
pub struct DdpSink {
    connection: DDPConnection,
    address: String,
}

impl DdpSink {
    pub fn connect(address: &str) -> Result<Self> {
        let dest_addr = ddp_destination(address);
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        let connection = DDPConnection::try_new(&dest_addr, PixelConfig::default(), ID::Default, socket)?;
        Ok(DdpSink { connection, address: dest_addr })
    }
}

/// WLED listens for DDP on 4048 unless the address names a port
pub fn ddp_destination(address: &str) -> String {
    if address.contains(':') {
        address.to_string()
    } else {
        format!("{}:{}", address, DDP_PORT)
    }
}

impl PixelSink for DdpSink {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.connection
            .write(data)
            .map(|_| ())
            .map_err(|e| anyhow!("Failed to send to {}: {}", self.address, e))
    }
}

/// Connect the sink selected in the config
pub fn connect(config: &AppConfig) -> Result<Box<dyn PixelSink>> {
    match config.sink {
        SinkKind::Opc => Ok(Box::new(OpcSink::connect(&config.opc_address)?)),
        SinkKind::Ddp => Ok(Box::new(DdpSink::connect(&config.ddp_address)?)),
    }
}
