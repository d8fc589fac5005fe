use std::io::Write;

use crate::{
    error::{RecorderError, Result},
    packet::EncodedPacket,
};

/// Container capability. Only ever driven from one thread at a time: the
/// packet sink's writer while recording, the session for the trailer.
pub trait Muxer: Send {
    fn write_header(&mut self) -> Result<()>;
    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()>;
    fn write_trailer(&mut self) -> Result<()>;
}

/// Headerless container that appends each packet payload to `W`.
pub struct RawMuxer<W: Write + Send> {
    inner: W,
    last_dts: Option<i64>,
    packets_written: u64,
    bytes_written: u64,
    have_written_header: bool,
    have_written_trailer: bool,
}

impl<W: Write + Send> RawMuxer<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            last_dts: None,
            packets_written: 0,
            bytes_written: 0,
            have_written_header: false,
            have_written_trailer: false,
        }
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl<W: Write + Send> Muxer for RawMuxer<W> {
    fn write_header(&mut self) -> Result<()> {
        self.have_written_header = true;
        Ok(())
    }

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()> {
        if !self.have_written_header {
            self.write_header()?;
        }
        if let Some(last) = self.last_dts {
            if packet.dts() <= last {
                return Err(RecorderError::Mux(format!(
                    "non monotonically increasing dts: {} after {}",
                    packet.dts(),
                    last
                )));
            }
        }
        self.inner.write_all(&packet.data())?;
        self.last_dts = Some(packet.dts());
        self.packets_written += 1;
        self.bytes_written += packet.size() as u64;
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        if self.have_written_header && !self.have_written_trailer {
            self.have_written_trailer = true;
            self.inner.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Rational;

    fn packet(index: u64, data: &[u8]) -> EncodedPacket {
        let mut packet = EncodedPacket::new(data.to_vec(), Rational::new(1, 30));
        packet.stamp(index);
        packet
    }

    #[test]
    fn test_raw_muxer_appends_payloads() {
        let mut muxer = RawMuxer::new(Vec::new());
        muxer.write_header().unwrap();
        muxer.write_packet(&packet(0, b"ab")).unwrap();
        muxer.write_packet(&packet(1, b"cd")).unwrap();
        muxer.write_trailer().unwrap();
        assert_eq!(muxer.packets_written(), 2);
        assert_eq!(muxer.bytes_written(), 4);
        assert_eq!(muxer.inner, b"abcd");
    }

    #[test]
    fn test_raw_muxer_rejects_out_of_order_dts() {
        let mut muxer = RawMuxer::new(Vec::new());
        muxer.write_packet(&packet(1, b"x")).unwrap();
        assert!(matches!(
            muxer.write_packet(&packet(0, b"y")),
            Err(RecorderError::Mux(_))
        ));
    }
}
