/*!
    byte links the driver can run on

    the driver only needs to know how many bytes are pending, to read them one by one without waiting, and to write a whole transmit buffer at once. Any serial-like link fits, the debug [NullTransport] included
*/

use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, Waker},
    };
use std::{
    collections::VecDeque,
    io,
    path::Path,
    };
use serial2_tokio::{SerialPort, CharSize, StopBits, Parity};
use tokio::io::{AsyncRead, ReadBuf};
use log::*;


/// a bidirectional byte link to the boards
pub trait Transport: Send {
    /// whether the link is open and usable, a driver refuses to start on an uninitialized link
    fn is_initialized(&self) -> bool;
    /// number of received bytes that can be read right now
    fn available(&mut self) -> usize;
    /// next received byte, never waiting
    fn read_byte(&mut self) -> Option<u8>;
    /// send all the given bytes
    fn write(&mut self, data: &[u8]) -> impl Future<Output = io::Result<()>> + Send;
}


/// serial port, as used with RS485 adapters
pub struct SerialTransport {
    port: SerialPort,
    received: VecDeque<u8>,
}

impl SerialTransport {
    /// open the given serial port file with the given baud rate, 8 bits, no parity, one stop bit
    pub fn open(path: impl AsRef<Path>, baud_rate: u32) -> io::Result<Self> {
        let port = SerialPort::open(path, |mut settings: serial2_tokio::Settings| {
                settings.set_raw();
                settings.set_baud_rate(baud_rate)?;
                settings.set_char_size(CharSize::Bits8);
                settings.set_stop_bits(StopBits::One);
                settings.set_parity(Parity::None);
                Ok(settings)
                })?;
        Ok(Self {
            port,
            received: VecDeque::new(),
        })
    }

    /// move what the port received so far into the reception queue, without waiting
    fn fill(&mut self) {
        let mut context = Context::from_waker(Waker::noop());
        let mut chunk = [0u8; 256];
        loop {
            let mut buffer = ReadBuf::new(&mut chunk);
            match Pin::new(&mut self.port).poll_read(&mut context, &mut buffer) {
                Poll::Ready(Ok(())) if !buffer.filled().is_empty() => {
                    self.received.extend(buffer.filled());
                },
                Poll::Ready(Err(error)) => {
                    warn!("serial reception failed: {}", error);
                    break
                },
                _ => break,
            }
        }
    }
}

impl Transport for SerialTransport {
    fn is_initialized(&self) -> bool {true}
    fn available(&mut self) -> usize {
        self.fill();
        self.received.len()
    }
    fn read_byte(&mut self) -> Option<u8> {
        if self.received.is_empty()
            {self.fill()}
        self.received.pop_front()
    }
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data).await
    }
}


/// link to nowhere, for running a driver without hardware
#[derive(Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn is_initialized(&self) -> bool {true}
    fn available(&mut self) -> usize {0}
    fn read_byte(&mut self) -> Option<u8> {None}
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        trace!("discarding {} bytes", data.len());
        Ok(())
    }
}
