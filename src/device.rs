//! Request/response cycles with live hardware.
//!
//! The MIDI transport itself is provided by the caller through [`MidiIn`] and [`MidiOut`].

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use tracing::{debug, trace, warn};

use crate::catalog::{Device, MemoryStore, ParseOptions};
use crate::proto::{IdentityRequest, IdentityResponse, Outgoing, SysExEvent, SysExParser};
use crate::seven_bit::{PackedInt24, U7};
use crate::util::{hexbuf, DEBUG_THRESHOLD};

/// Time a device gets to answer a request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

pub type SubscriptionId = u64;

pub trait MidiOut {
    fn send(&self, event: &SysExEvent) -> Result<()>;
}

/// Source of complete SysEx frames. Every subscriber gets every frame.
pub trait MidiIn {
    fn subscribe(&self) -> (SubscriptionId, Receiver<Vec<u8>>);
    fn unsubscribe(&self, id: SubscriptionId);
}

impl<T: MidiOut + ?Sized> MidiOut for &T {
    fn send(&self, event: &SysExEvent) -> Result<()> {
        (**self).send(event)
    }
}

impl<T: MidiIn + ?Sized> MidiIn for &T {
    fn subscribe(&self) -> (SubscriptionId, Receiver<Vec<u8>>) {
        (**self).subscribe()
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        (**self).unsubscribe(id)
    }
}

/// Listener registration, released when dropped.
struct Subscription<'a, I: MidiIn> {
    input: &'a I,
    id: SubscriptionId,
    frames: Receiver<Vec<u8>>,
}

impl<'a, I: MidiIn> Subscription<'a, I> {
    fn new(input: &'a I) -> Self {
        let (id, frames) = input.subscribe();
        trace!(id, "subscribed");
        Self { input, id, frames }
    }

    /// Next frame received before `deadline`.
    fn next_before(&self, deadline: Instant) -> Result<Option<Vec<u8>>> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.frames.recv_timeout(remaining) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => bail!("MIDI input closed"),
        }
    }
}

impl<I: MidiIn> Drop for Subscription<'_, I> {
    fn drop(&mut self) {
        self.input.unsubscribe(self.id);
        trace!(id = self.id, "unsubscribed");
    }
}

/// Pair of MIDI ports talking to one or more devices.
pub struct Connection<I, O> {
    input: I,
    output: O,
    parser: SysExParser,
    timeout: Duration,
}

impl<I: MidiIn, O: MidiOut> Connection<I, O> {
    pub fn new(input: I, output: O, options: ParseOptions) -> Self {
        Self {
            input,
            output,
            parser: SysExParser::new(options),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn send(&self, event: &SysExEvent) -> Result<()> {
        let raw = event.as_bytes();
        if raw.len() > DEBUG_THRESHOLD {
            debug!(len = raw.len(), "send msg");
            trace!(raw = ?hexbuf(raw), len = raw.len(), "send msg");
        } else {
            debug!(raw = ?hexbuf(raw), len = raw.len(), "send msg");
        }
        self.output.send(event)
    }

    /// Asks devices listening on `channel` who they are. Returns the first answer.
    pub fn query_identity(&self, channel: U7) -> Result<Option<IdentityResponse>> {
        let subscription = Subscription::new(&self.input);
        self.send(&IdentityRequest { channel }.to_event()?)?;

        let deadline = Instant::now() + self.timeout;
        let mut scratch = MemoryStore::default();
        while let Some(frame) = subscription.next_before(deadline)? {
            let report = self.parser.parse(&frame, &mut scratch);
            if let Some(identity) = report.identities.into_iter().next() {
                return Ok(Some(identity));
            }
        }

        warn!(timeout = %humantime::format_duration(self.timeout), %channel, "no identity response");
        Ok(None)
    }

    /// Requests `size` bytes at `address` and waits for `device` to dump them into `store`.
    ///
    /// Returns the byte stored at `address` afterwards, or `None` when the device stays silent.
    pub fn request_memory(
        &self,
        device: &Device,
        address: PackedInt24,
        size: PackedInt24,
        store: &mut MemoryStore,
    ) -> Result<Option<u8>> {
        let subscription = Subscription::new(&self.input);
        self.send(&device.request_data(address, size)?)?;

        let deadline = Instant::now() + self.timeout;
        while let Some(frame) = subscription.next_before(deadline)? {
            let report = self.parser.parse(&frame, store);
            if report.device.as_ref() != Some(device) {
                trace!(%device, frame = ?hexbuf(&frame), "ignore frame");
                continue;
            }

            let memory = store
                .memory(device)
                .ok_or_else(|| anyhow!("{device} has no memory"))?;
            return Ok(Some(memory.read_byte(address)?));
        }

        warn!(
            timeout = %humantime::format_duration(self.timeout),
            %device,
            %address,
            "no response"
        );
        Ok(None)
    }

    pub fn send_memory(&self, device: &Device, address: PackedInt24, data: &[u8]) -> Result<()> {
        debug!(%device, %address, len = data.len(), "write memory");
        self.send(&device.send_data(address, data)?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::mpsc::{self, Sender};
    use std::sync::Mutex;

    use hex_literal::hex;

    use super::*;
    use crate::catalog::find_device;
    use crate::memory::{DeviceMemory, LibraryError, MemoryMap, MemoryMapFormat};

    /// Port pair answering each sent frame with the next queued reply.
    #[derive(Default)]
    struct Loopback {
        next_id: Mutex<SubscriptionId>,
        subscribers: Mutex<Vec<(SubscriptionId, Sender<Vec<u8>>)>>,
        replies: Mutex<VecDeque<Vec<u8>>>,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl Loopback {
        fn reply_with(&self, frames: impl IntoIterator<Item = Vec<u8>>) {
            self.replies.lock().unwrap().extend(frames);
        }

        fn subscriber_count(&self) -> usize {
            self.subscribers.lock().unwrap().len()
        }
    }

    impl MidiOut for Loopback {
        fn send(&self, event: &SysExEvent) -> Result<()> {
            self.sent.lock().unwrap().push(event.as_bytes().to_vec());
            let replies: Vec<_> = self.replies.lock().unwrap().drain(..).collect();
            for reply in replies {
                for (_, subscriber) in self.subscribers.lock().unwrap().iter() {
                    subscriber.send(reply.clone())?;
                }
            }
            Ok(())
        }
    }

    impl MidiIn for Loopback {
        fn subscribe(&self) -> (SubscriptionId, Receiver<Vec<u8>>) {
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            let (sender, receiver) = mpsc::channel();
            self.subscribers.lock().unwrap().push((*next_id, sender));
            (*next_id, receiver)
        }

        fn unsubscribe(&self, id: SubscriptionId) {
            self.subscribers.lock().unwrap().retain(|(known, _)| *known != id);
        }
    }

    fn store() -> MemoryStore {
        MemoryStore::new(|device: &Device| -> Result<DeviceMemory, LibraryError> {
            Ok(DeviceMemory::new(
                device.model().name(),
                [MemoryMap::new("Patch", PackedInt24::ZERO, 0x400, MemoryMapFormat::Bytes)],
            ))
        })
    }

    fn connection(bus: &Loopback) -> Connection<&Loopback, &Loopback> {
        Connection::new(bus, bus, ParseOptions::default()).with_timeout(Duration::from_millis(50))
    }

    #[test]
    fn request_then_dump() {
        let bus = Loopback::default();
        let jv = find_device("Roland", "JV-1010").unwrap();
        let address = PackedInt24::new(0x100);
        bus.reply_with([jv.send_data(address, &[0x2A, 0x01]).unwrap().into_bytes()]);

        let mut store = store();
        let value = connection(&bus)
            .request_memory(&jv, address, PackedInt24::new(2), &mut store)
            .unwrap();
        assert_eq!(value, Some(0x2A));
        assert_eq!(bus.sent.lock().unwrap()[0], hex!("F0 41 10 6A 11 00 02 00 00 00 02 7C F7"));
        assert_eq!(bus.subscriber_count(), 0);
        assert!(store.memory(&jv).unwrap().is_written(address + 1));
    }

    #[test]
    fn timeout_returns_nothing() {
        let bus = Loopback::default();
        let jv = find_device("Roland", "JV-1010").unwrap();
        let d70 = find_device("Roland", "D-70").unwrap();
        bus.reply_with([d70.send_data(PackedInt24::ZERO, &[0x01]).unwrap().into_bytes()]);

        let mut store = store();
        let value = connection(&bus)
            .request_memory(&jv, PackedInt24::ZERO, PackedInt24::new(1), &mut store)
            .unwrap();
        assert_eq!(value, None);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(store.memory(&d70).is_some());
    }

    #[test]
    fn identity() {
        let bus = Loopback::default();
        bus.reply_with([hex!("F0 7E 10 06 02 41 6A 01 05 00 00 03 00 00 F7").to_vec()]);

        let identity = connection(&bus)
            .query_identity(IdentityRequest::BROADCAST)
            .unwrap()
            .unwrap();
        assert_eq!(identity.manufacturer.name(), "Roland");
        assert_eq!(bus.sent.lock().unwrap()[0], hex!("F0 7E 7F 06 01 F7"));
        assert!(connection(&bus).query_identity(U7::new(0)).unwrap().is_none());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn unsupported_write() {
        let bus = Loopback::default();
        let neutron = find_device("Behringer", "Neutron").unwrap();
        assert!(connection(&bus)
            .send_memory(&neutron, PackedInt24::ZERO, &[0x01])
            .is_err());
        assert!(bus.sent.lock().unwrap().is_empty());
    }
}
