//! Client connections
//!
//! Each connection owns an input and an output ring. Bytes move between the
//! socket and the rings with non-blocking reads and writes; requests are
//! framed out of the input ring and replies, errors and events are queued on
//! the output ring.

use std::io;

use tokio::io::{Interest, Ready};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tracing::debug;

use crate::error::XError;
use crate::events::{encode_error, Event, EVENT_SIZE};
use crate::object::Handle;
use crate::proto::{self, DEPTHS, FORMATS};
use crate::ringbuf::{pad4, ByteOrder, Reader, RingBuf, Writer};
use crate::server::Screen;

pub const BUFFER_SIZE: usize = 1 << 20;
const PREAMBLE_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Waiting for the 12-byte preamble.
    Setup,
    /// Waiting for the authorization blobs.
    Connecting,
    Connected,
    /// Draining output before closing.
    Closing,
    Closed,
}

pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    pub async fn ready(&self, interest: Interest) -> io::Result<Ready> {
        match self {
            Stream::Tcp(s) => s.ready(interest).await,
            #[cfg(unix)]
            Stream::Unix(s) => s.ready(interest).await,
        }
    }

    pub fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.try_read(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.try_read(buf),
        }
    }

    pub fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.try_write(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.try_write(buf),
        }
    }
}

/// Header of the request currently being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub opcode: u8,
    pub detail: u8,
    /// Total length in 4-byte units, header included.
    pub length: u16,
    pub sequence: u16,
}

impl PendingRequest {
    pub fn body_len(&self) -> usize {
        (self.length as usize).saturating_sub(1) * 4
    }
}

pub enum NextRequest {
    /// Nothing to do until more input arrives or output drains.
    Idle,
    /// Header and body are complete.
    Ready(PendingRequest, Vec<u8>),
    /// A header with length zero; it has been consumed.
    ZeroLength(PendingRequest),
}

pub struct Client {
    pub id: ClientId,
    pub state: ClientState,
    stream: Option<Stream>,
    input: RingBuf,
    output: RingBuf,
    pub order: ByteOrder,
    pub id_base: u32,
    pub id_mask: u32,
    /// Sequence number of the last request read.
    pub sequence: u16,
    pending: Option<PendingRequest>,
    /// Auth name and data lengths from the preamble, padded.
    auth_len: usize,
    /// Owned resources in creation order.
    pub objects: Vec<Handle>,
}

impl Client {
    pub fn new(id: ClientId, stream: Option<Stream>, id_base: u32, id_mask: u32) -> Self {
        Self {
            id,
            state: ClientState::Setup,
            stream,
            input: RingBuf::new(BUFFER_SIZE),
            output: RingBuf::new(BUFFER_SIZE),
            order: ByteOrder::Little,
            id_base,
            id_mask,
            sequence: 0,
            pending: None,
            auth_len: 0,
            objects: Vec::new(),
        }
    }

    pub fn stream(&self) -> Option<&Stream> {
        self.stream.as_ref()
    }

    /// True if `id` falls in this client's resource id range.
    pub fn id_in_range(&self, id: u32) -> bool {
        id >= self.id_base && id - self.id_base < self.id_mask
    }

    /// Socket readiness this client is waiting for.
    pub fn interest(&self) -> Option<Interest> {
        let read = matches!(
            self.state,
            ClientState::Setup | ClientState::Connecting | ClientState::Connected
        ) && self.input.free() > 0;
        let write = !self.output.is_empty();
        match (read, write) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }

    /// Append bytes as if read from the socket.
    pub fn feed(&mut self, bytes: &[u8]) -> bool {
        self.input.write(bytes)
    }

    /// Pull everything the socket has, up to the input ring's capacity. EOF
    /// or a hard error closes the client.
    pub fn read_socket(&mut self) {
        let Some(stream) = self.stream.as_ref() else {
            return;
        };
        while self.input.free() > 0 {
            let buf = self.input.contiguous_write();
            match stream.try_read(buf) {
                Ok(0) => {
                    debug!(client = self.id.0, "connection closed by peer");
                    self.state = ClientState::Closed;
                    return;
                }
                Ok(n) => self.input.advance_write(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    debug!(client = self.id.0, "read failed: {}", e);
                    self.state = ClientState::Closed;
                    return;
                }
            }
        }
    }

    /// Push queued output to the socket.
    pub fn write_socket(&mut self) {
        if let Some(stream) = self.stream.as_ref() {
            while !self.output.is_empty() {
                match stream.try_write(self.output.contiguous_read()) {
                    Ok(0) => break,
                    Ok(n) => self.output.advance_read(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        debug!(client = self.id.0, "write failed: {}", e);
                        self.state = ClientState::Closed;
                        return;
                    }
                }
            }
        }
        if self.state == ClientState::Closing && self.output.is_empty() {
            self.state = ClientState::Closed;
        }
    }

    /// Drain everything queued for the client, for sockets-free callers.
    pub fn take_output(&mut self) -> Vec<u8> {
        let mut out = vec![0u8; self.output.len()];
        self.output.read(&mut out);
        out
    }

    pub fn output_free(&self) -> usize {
        self.output.free()
    }

    /// Queue raw bytes; all or nothing.
    pub fn write(&mut self, bytes: &[u8]) -> bool {
        self.output.write(bytes)
    }

    /// Queue an event. Dropped unless the client is connected and has room.
    pub fn send_event(&mut self, event: &Event) {
        if self.state != ClientState::Connected || self.output.free() < EVENT_SIZE {
            return;
        }
        self.output.write(&event.encode(self.order, self.sequence));
    }

    pub fn send_error(&mut self, err: XError, major: u8) {
        let pkt = encode_error(self.order, err, self.sequence, major);
        if !self.output.write(&pkt) {
            debug!(client = self.id.0, "dropping error {:?}: output full", err);
        }
    }

    /// Consume and validate the connection preamble.
    pub fn read_preamble(&mut self) {
        let mut pre = [0u8; PREAMBLE_SIZE];
        if !self.input.read(&mut pre) {
            return;
        }
        let Some(order) = ByteOrder::from_marker(pre[0]) else {
            debug!(client = self.id.0, "bad byte order marker {:#x}", pre[0]);
            self.state = ClientState::Closed;
            return;
        };
        self.order = order;
        let name_len = order.u16_from([pre[6], pre[7]]) as usize;
        let data_len = order.u16_from([pre[8], pre[9]]) as usize;
        self.auth_len = name_len + pad4(name_len) + data_len + pad4(data_len);
        let major = order.u16_from([pre[2], pre[3]]);
        debug!(client = self.id.0, ?order, major, "preamble");
        self.state = ClientState::Connecting;
    }

    /// Discard the auth blobs once complete. Returns true when done.
    pub fn skip_auth(&mut self) -> bool {
        if self.input.len() < self.auth_len {
            return false;
        }
        self.input.advance_read(self.auth_len);
        self.auth_len = 0;
        true
    }

    /// Frame the next request out of the input ring.
    pub fn next_request(&mut self) -> NextRequest {
        let req = match self.pending {
            Some(req) => req,
            None => {
                // room for at least an error packet before starting
                if self.output.free() < EVENT_SIZE {
                    return NextRequest::Idle;
                }
                let mut hdr = [0u8; 4];
                if !self.input.read(&mut hdr) {
                    return NextRequest::Idle;
                }
                self.sequence = self.sequence.wrapping_add(1);
                let req = PendingRequest {
                    opcode: hdr[0],
                    detail: hdr[1],
                    length: self.order.u16_from([hdr[2], hdr[3]]),
                    sequence: self.sequence,
                };
                if req.length == 0 {
                    return NextRequest::ZeroLength(req);
                }
                self.pending = Some(req);
                req
            }
        };
        let mut body = vec![0u8; req.body_len()];
        if !self.input.peek(0, &mut body) {
            return NextRequest::Idle;
        }
        NextRequest::Ready(req, body)
    }

    /// Consume the body of the pending request.
    pub fn finish_request(&mut self) {
        if let Some(req) = self.pending.take() {
            self.input.advance_read(req.body_len());
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn reader<'a>(&self, body: &'a [u8]) -> Reader<'a> {
        Reader::new(body, self.order)
    }

    pub fn writer(&self) -> Writer {
        Writer::new(self.order)
    }
}

/// The connection setup success reply.
pub fn setup_reply(order: ByteOrder, id_base: u32, id_mask: u32, screen: &Screen) -> Vec<u8> {
    let vendor = proto::VENDOR.as_bytes();
    let screen_words: usize = 10 + DEPTHS.iter().map(|d| 2 + 6 * d.visuals.len()).sum::<usize>();
    let words = 8 + 2 * FORMATS.len() + vendor.len().div_ceil(4) + screen_words;

    let mut w = Writer::with_capacity(order, 8 + words * 4);
    w.u8(1)
        .pad(1)
        .u16(proto::MAJOR_VERSION)
        .u16(proto::MINOR_VERSION)
        .u16(words as u16);
    w.u32(proto::RELEASE_NUMBER)
        .u32(id_base)
        .u32(id_mask)
        .u32(proto::MOTION_BUFFER_SIZE)
        .u16(vendor.len() as u16)
        .u16(proto::MAX_REQUEST_LENGTH)
        .u8(1)
        .u8(FORMATS.len() as u8)
        .u8(proto::LSB_FIRST)
        .u8(proto::LSB_FIRST)
        .u8(32)
        .u8(32)
        .u8(proto::MIN_KEYCODE)
        .u8(proto::MAX_KEYCODE)
        .pad(4)
        .bytes(vendor)
        .align();
    for f in FORMATS {
        w.u8(f.depth).u8(f.bpp).u8(f.scanline_pad).pad(5);
    }
    w.u32(screen.root)
        .u32(screen.default_colormap)
        .u32(screen.white_pixel)
        .u32(screen.black_pixel)
        .u32(screen.input_mask)
        .u16(screen.width)
        .u16(screen.height)
        .u16(screen.width_mm)
        .u16(screen.height_mm)
        .u16(1)
        .u16(1)
        .u32(screen.root_visual)
        .u8(0)
        .u8(0)
        .u8(screen.root_depth)
        .u8(DEPTHS.len() as u8);
    for d in DEPTHS {
        w.u8(d.depth).pad(1).u16(d.visuals.len() as u16).pad(4);
        for v in d.visuals {
            w.u32(v.id)
                .u8(v.class)
                .u8(v.bits_per_rgb)
                .u16(v.colormap_entries)
                .u32(v.red_mask)
                .u32(v.green_mask)
                .u32(v.blue_mask)
                .pad(4);
        }
    }
    w.finish()
}
