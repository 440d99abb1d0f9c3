//! Server context and main loop
//!
//! All state lives in one [`Server`] owned by a single task. The loop waits
//! for new connections, client socket readiness or the frame tick, services
//! every client with non-blocking I/O, reaps closed connections and, on each
//! frame, feeds backend input through the grab engine and presents damage.

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Instant;

use anyhow::{Context, Result};
use futures_util::future::select_all;
use tokio::io::Interest;
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::atom::AtomTable;
use crate::backend::{Backend, InputEvent};
use crate::client::{setup_reply, Client, ClientId, ClientState, NextRequest, Stream};
use crate::compositor::{composite, CursorOverlay, Framebuffer};
use crate::config::ServerConfig;
use crate::drawable::Drawable;
use crate::error::{Flow, RequestError, XError};
use crate::events::Event;
use crate::fatal;
use crate::input::Input;
use crate::font::{glyph_cursor, FontTable, LEFT_PTR};
use crate::object::{Colormap, Handle, ObjectKind, Registry};
use crate::proto::{EventMask, ROOT_VISUAL};
use crate::rect::Rect;
use crate::window::{Background, Window, WindowClass};

const ID_SLOTS: usize = 0x200;
const RESERVED_SLOTS: usize = 8;
const ID_SHIFT: u32 = 20;
pub const ID_MASK: u32 = 0xfffff;
const ROOT_BACKGROUND: u32 = 0x202020;

/// Static description of the single screen.
#[derive(Debug, Clone)]
pub struct Screen {
    pub root: u32,
    pub default_colormap: u32,
    pub white_pixel: u32,
    pub black_pixel: u32,
    pub input_mask: u32,
    pub width: u16,
    pub height: u16,
    pub width_mm: u16,
    pub height_mm: u16,
    pub root_visual: u32,
    pub root_depth: u8,
}

#[derive(Debug, Default)]
pub struct ServerGrab {
    pub holder: Option<ClientId>,
    pub depth: u32,
}

pub struct Server {
    pub config: ServerConfig,
    pub objects: Registry,
    pub clients: BTreeMap<ClientId, Client>,
    pub atoms: AtomTable,
    pub screen: Screen,
    pub root: Handle,
    pub default_cursor: Handle,
    pub fonts: FontTable,
    pub input: Input,
    pub framebuffer: Framebuffer,
    pub damage: Rect,
    pub server_grab: ServerGrab,
    id_slots: Vec<bool>,
    next_client: u32,
    xid: u32,
    start: Instant,
    /// References taken while decoding the current request.
    request_refs: Vec<Handle>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let (width, height) = (config.width, config.height);
        let mut objects = Registry::new();

        let root_id = 1;
        let colormap_id = 2;
        let drawable = Drawable::new(width, height, 24, root_id, ROOT_BACKGROUND)
            .map_err(|e| anyhow::anyhow!("failed to allocate root window: {}", e))?;
        let mut root_window = Window::new(drawable, None, 0, 0, 0, 0, WindowClass::InputOutput, ROOT_VISUAL);
        root_window.mapped = true;
        root_window.attributes.background = Background::Pixel(ROOT_BACKGROUND);
        let root = objects.insert(root_id, None, ObjectKind::Window(Box::new(root_window)));
        let colormap = objects.insert(colormap_id, None, ObjectKind::Colormap(Colormap { visual: ROOT_VISUAL }));
        objects.retain(colormap);
        objects.window_mut(root).attributes.colormap = Some(colormap);

        let mut xid = colormap_id;
        let fonts = FontTable::build(&mut objects, root_id, &mut xid)
            .map_err(|e| anyhow::anyhow!("failed to render built-in fonts: {}", e))?;
        xid += 1;
        let cursor = default_cursor(&mut objects, &fonts, xid)?;
        objects.retain(cursor);
        objects.window_mut(root).attributes.cursor = Some(cursor);

        let screen = Screen {
            root: root_id,
            default_colormap: colormap_id,
            white_pixel: 0xffffff,
            black_pixel: 0,
            input_mask: 0,
            width,
            height,
            // 96 dpi
            width_mm: (width as u32 * 254 / 960) as u16,
            height_mm: (height as u32 * 254 / 960) as u16,
            root_visual: ROOT_VISUAL,
            root_depth: 24,
        };

        objects.retain(root);
        objects.retain(cursor);
        let input = Input::new(root, cursor, width as i64 / 2, height as i64 / 2);
        let framebuffer = Framebuffer::new(width as usize, height as usize);
        let damage = framebuffer.bounds();

        let mut id_slots = vec![false; ID_SLOTS];
        id_slots[..RESERVED_SLOTS].fill(true);

        Ok(Self {
            config,
            objects,
            clients: BTreeMap::new(),
            atoms: AtomTable::new(),
            screen,
            root,
            default_cursor: cursor,
            fonts,
            input,
            framebuffer,
            damage,
            server_grab: ServerGrab::default(),
            id_slots,
            next_client: 1,
            xid,
            start: Instant::now(),
            request_refs: Vec::new(),
        })
    }

    /// Milliseconds since startup, as carried in event timestamps.
    pub fn now(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }

    /// Allocate an id for a server-owned resource.
    pub fn alloc_server_id(&mut self) -> u32 {
        self.xid += 1;
        if self.xid >= (RESERVED_SLOTS as u32) << ID_SHIFT {
            fatal!("server resource ids exhausted");
        }
        self.xid
    }

    // -- clients --

    /// Register a connection. Fails when every id range is taken.
    pub fn add_client(&mut self, stream: Option<Stream>) -> Option<ClientId> {
        let Some(slot) = self.id_slots.iter().position(|used| !used) else {
            warn!("rejecting connection: no free resource id ranges");
            return None;
        };
        self.id_slots[slot] = true;
        let id = ClientId(self.next_client);
        self.next_client += 1;
        let client = Client::new(id, stream, (slot as u32) << ID_SHIFT, ID_MASK);
        debug!(client = id.0, id_base = format_args!("{:#x}", client.id_base), "client added");
        self.clients.insert(id, client);
        Some(id)
    }

    /// True iff `id` lies in the client's range and is not in use.
    pub fn client_has_free_id(&self, client: ClientId, id: u32) -> bool {
        self.clients.get(&client).is_some_and(|c| c.id_in_range(id)) && !self.objects.contains(id)
    }

    /// Tear down a closed client and everything it owns.
    pub fn remove_client(&mut self, id: ClientId) {
        self.objects.drop_subscriptions(id);

        let owned = self
            .clients
            .get(&id)
            .map(|c| c.objects.clone())
            .unwrap_or_default();
        for h in owned {
            if self.objects.is_live(h) {
                self.free_resource(h);
            }
        }

        for w in self.objects.windows() {
            let grabs: Vec<_> = {
                let win = self.objects.window_mut(w);
                let (mine, rest) = win.button_grabs.drain(..).partition(|g| g.client == id);
                win.button_grabs = rest;
                mine
            };
            for g in grabs {
                self.release_grab_refs(g.confine_to, g.cursor);
            }
        }

        if self.input.grab.as_ref().is_some_and(|g| g.client == id) {
            self.ungrab_pointer();
        }

        if let Some(client) = self.clients.remove(&id) {
            let slot = (client.id_base >> ID_SHIFT) as usize;
            self.id_slots[slot] = false;
        }

        if self.server_grab.holder == Some(id) {
            self.server_grab = ServerGrab::default();
        }
        debug!(client = id.0, "client removed");
    }

    pub(crate) fn release_grab_refs(&mut self, confine_to: Option<Handle>, cursor: Option<Handle>) {
        for h in confine_to.into_iter().chain(cursor) {
            self.objects.release(h);
        }
    }

    /// Clients whose sockets may be serviced now.
    fn serviceable(&self, id: ClientId) -> bool {
        match self.server_grab.holder {
            Some(holder) => holder == id,
            None => true,
        }
    }

    /// Run one client's state machine as far as buffered input allows.
    pub fn service_client(&mut self, id: ClientId) {
        let Some(client) = self.clients.get_mut(&id) else {
            return;
        };
        client.read_socket();

        loop {
            let Some(client) = self.clients.get_mut(&id) else {
                return;
            };
            match client.state {
                ClientState::Setup => {
                    client.read_preamble();
                    if client.state == ClientState::Setup {
                        break;
                    }
                }
                ClientState::Connecting => {
                    if !client.skip_auth() {
                        break;
                    }
                    let reply = setup_reply(client.order, client.id_base, client.id_mask, &self.screen);
                    if client.write(&reply) {
                        client.state = ClientState::Connected;
                        info!(client = id.0, "client connected");
                    } else {
                        client.state = ClientState::Closed;
                    }
                }
                ClientState::Connected => {
                    self.process_requests(id);
                    break;
                }
                ClientState::Closing | ClientState::Closed => break,
            }
        }

        if let Some(client) = self.clients.get_mut(&id) {
            client.write_socket();
        }
    }

    fn process_requests(&mut self, id: ClientId) {
        loop {
            if !self.serviceable(id) {
                return;
            }
            let Some(client) = self.clients.get_mut(&id) else {
                return;
            };
            if client.state != ClientState::Connected {
                return;
            }
            let (req, body) = match client.next_request() {
                NextRequest::Idle => return,
                NextRequest::ZeroLength(req) => {
                    client.send_error(XError::Length, req.opcode);
                    continue;
                }
                NextRequest::Ready(req, body) => (req, body),
            };

            let result = self.dispatch(id, &req, &body);
            for h in std::mem::take(&mut self.request_refs) {
                self.objects.release(h);
            }

            let Some(client) = self.clients.get_mut(&id) else {
                return;
            };
            match result {
                Ok(Flow::Handled) => client.finish_request(),
                Ok(Flow::WouldBlock) => return,
                Err(RequestError::Protocol(e)) => {
                    debug!(client = id.0, opcode = req.opcode, seq = req.sequence, "error: {}", e);
                    client.send_error(e, req.opcode);
                    client.finish_request();
                }
                Err(RequestError::Fatal(msg)) => {
                    warn!(client = id.0, "closing connection: {}", msg);
                    client.state = ClientState::Closed;
                    return;
                }
            }
        }
    }

    /// Keep `h` referenced until the current request completes.
    pub(crate) fn hold(&mut self, h: Handle) -> Handle {
        self.request_refs.push(h);
        h
    }

    /// Service every client that is not shut out by a server grab, then drop
    /// the closed ones.
    pub fn service_clients(&mut self) {
        let ids: Vec<ClientId> = self.clients.keys().copied().collect();
        for id in ids {
            if self.serviceable(id) {
                self.service_client(id);
            } else if let Some(c) = self.clients.get_mut(&id) {
                c.write_socket();
            }
        }
        let closed: Vec<ClientId> = self
            .clients
            .values()
            .filter(|c| c.state == ClientState::Closed)
            .map(|c| c.id)
            .collect();
        for id in closed {
            self.remove_client(id);
        }
    }

    // -- resources --

    /// Register a resource owned by `owner`.
    pub fn register(&mut self, id: u32, owner: Option<ClientId>, kind: ObjectKind) -> Handle {
        let h = self.objects.insert(id, owner, kind);
        if let Some(c) = owner.and_then(|o| self.clients.get_mut(&o)) {
            c.objects.push(h);
        }
        h
    }

    /// Remove `h` from the id index and from its owner's list.
    pub fn destroy_object(&mut self, h: Handle) {
        if let Some(c) = self.objects.get(h).owner.and_then(|o| self.clients.get_mut(&o)) {
            c.objects.retain(|&o| o != h);
        }
        self.objects.unlink(h);
    }

    /// Destroy a resource and drop its creation reference.
    pub fn free_resource(&mut self, h: Handle) {
        if self.objects.is_window(h) {
            self.destroy_window(h);
        } else {
            self.destroy_object(h);
            self.objects.release(h);
        }
    }

    // -- event delivery --

    pub fn send_event(&mut self, client: ClientId, event: &Event) {
        if let Some(c) = self.clients.get_mut(&client) {
            c.send_event(event);
        }
    }

    /// Send to every client selecting `mask` on `window`.
    pub fn deliver(&mut self, window: Handle, mask: EventMask, event: &Event) -> bool {
        let targets: Vec<ClientId> = self
            .objects
            .window(window)
            .events
            .iter()
            .filter(|s| s.mask.intersects(mask))
            .map(|s| s.client)
            .collect();
        for &c in &targets {
            self.send_event(c, event);
        }
        !targets.is_empty()
    }

    /// Structure events: to `window`'s StructureNotify selectors with the
    /// window as event window, and to the parent's SubstructureNotify
    /// selectors with the parent as event window.
    pub fn deliver_structure(&mut self, window: Handle, parent_first_only: bool, make: impl Fn(u32) -> Event) {
        let wid = self.objects.id(window);
        self.deliver(window, EventMask::STRUCTURE_NOTIFY, &make(wid));
        if let Some(parent) = self.objects.parent(window) {
            let pid = self.objects.id(parent);
            let subs: Vec<ClientId> = self
                .objects
                .window(parent)
                .events
                .iter()
                .filter(|s| s.mask.contains(EventMask::SUBSTRUCTURE_NOTIFY))
                .map(|s| s.client)
                .collect();
            let event = make(pid);
            let take = if parent_first_only { 1 } else { subs.len() };
            for c in subs.into_iter().take(take) {
                self.send_event(c, &event);
            }
        }
    }

    /// First client other than `except` holding `mask` on `window`.
    pub fn redirect_target(&self, window: Handle, mask: EventMask, except: ClientId) -> Option<ClientId> {
        self.objects
            .window(window)
            .events
            .iter()
            .find(|s| s.mask.contains(mask) && s.client != except)
            .map(|s| s.client)
    }

    // -- damage and presentation --

    /// Add a screen rectangle to the damage.
    pub fn redraw(&mut self, rect: Rect) {
        let r = rect.intersect(&self.framebuffer.bounds());
        if !r.is_empty() {
            self.damage = self.damage.union(&r);
        }
    }

    pub fn redraw_window(&mut self, h: Handle) {
        let r = self.objects.full_rect(h);
        self.redraw(r);
    }

    pub fn cursor_overlay(&self) -> Option<CursorOverlay> {
        let cursor = self.input.cursor?;
        let c = self.objects.cursor(cursor);
        Some(CursorOverlay {
            cursor,
            x: self.input.x - c.hot_x as i64,
            y: self.input.y - c.hot_y as i64,
        })
    }

    /// Composite accumulated damage into the framebuffer and return the
    /// rectangle that changed.
    pub fn composite_damage(&mut self) -> Option<Rect> {
        if self.damage.is_empty() {
            return None;
        }
        let dirty = self.damage;
        let cursor = self.cursor_overlay();
        composite(&self.objects, self.root, &mut self.framebuffer, dirty, cursor);
        self.damage = Rect::EMPTY;
        Some(dirty)
    }

    /// One frame: feed backend input, then present any damage.
    pub fn frame(&mut self, backend: &mut dyn Backend) -> Result<()> {
        for event in backend.poll()? {
            self.handle_input(event);
        }
        if let Some(dirty) = self.composite_damage() {
            backend.display(&self.framebuffer, dirty)?;
        }
        Ok(())
    }

    pub fn handle_input(&mut self, event: InputEvent) {
        match event {
            InputEvent::Motion { x, y } => self.pointer_motion(x, y),
            InputEvent::RelativeMotion { dx, dy } => {
                let (dx, dy) = self.input.pointer_control.accelerate(dx, dy);
                let (x, y) = (self.input.x + dx, self.input.y + dy);
                self.pointer_motion(x, y);
            }
            InputEvent::Button { button, pressed } => self.button_event(button, pressed),
            InputEvent::Scroll { up } => {
                let button = if up { 4 } else { 5 };
                self.button_event(button, true);
                self.button_event(button, false);
            }
            InputEvent::Key { keycode, pressed } => self.key_event(keycode, pressed),
        }
    }

    /// Accept connections and serve until the backend closes.
    pub async fn run(mut self, mut backend: Box<dyn Backend>) -> Result<()> {
        let listeners = Listeners::bind(&self.config).await?;
        let mut tick = tokio::time::interval(self.config.frame_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        eprintln!("x11qd ready - DISPLAY=:{}", self.config.display);

        loop {
            let wake = {
                let waits = self.client_waits();
                tokio::select! {
                    conn = listeners.accept() => Wake::Accept(conn),
                    _ = any_ready(waits) => Wake::Client,
                    _ = tick.tick() => Wake::Frame,
                }
            };

            match wake {
                Wake::Accept(Ok(stream)) => {
                    if let Some(id) = self.add_client(Some(stream)) {
                        info!(client = id.0, "accepted connection");
                    }
                }
                Wake::Accept(Err(e)) => warn!("accept failed: {}", e),
                Wake::Client => {}
                Wake::Frame => {
                    self.frame(backend.as_mut())?;
                    if !backend.is_open() {
                        info!("display closed, shutting down");
                        break;
                    }
                }
            }
            self.service_clients();
        }
        Ok(())
    }

    /// Readiness futures for every client with socket work pending. Clients
    /// shut out by a server grab only wait to flush output.
    fn client_waits(&self) -> Vec<Pin<Box<dyn Future<Output = ()> + '_>>> {
        self.clients
            .values()
            .filter_map(|c| {
                let stream = c.stream()?;
                let mut interest = c.interest()?;
                if !self.serviceable(c.id) {
                    if c.output_free() == crate::client::BUFFER_SIZE {
                        return None;
                    }
                    interest = Interest::WRITABLE;
                }
                let fut: Pin<Box<dyn Future<Output = ()> + '_>> = Box::pin(async move {
                    let _ = stream.ready(interest).await;
                });
                Some(fut)
            })
            .collect()
    }
}

enum Wake {
    Accept(io::Result<Stream>),
    Client,
    Frame,
}

async fn any_ready(waits: Vec<Pin<Box<dyn Future<Output = ()> + '_>>>) {
    if waits.is_empty() {
        std::future::pending::<()>().await;
    } else {
        select_all(waits).await;
    }
}

struct Listeners {
    tcp: Option<TcpListener>,
    #[cfg(unix)]
    unix: Option<UnixListener>,
}

impl Listeners {
    async fn bind(config: &ServerConfig) -> Result<Self> {
        let tcp = if config.tcp {
            let port = config.tcp_port();
            let listener = TcpListener::bind(("0.0.0.0", port))
                .await
                .with_context(|| format!("failed to bind TCP port {}", port))?;
            eprintln!("listening on TCP port {} (DISPLAY=hostname:{})", port, config.display);
            Some(listener)
        } else {
            None
        };

        #[cfg(unix)]
        let unix = {
            let dir = &config.unix_dir;
            let path = dir.join(format!("X{}", config.display));
            let _ = std::fs::remove_file(&path);
            std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
            let listener =
                UnixListener::bind(&path).with_context(|| format!("failed to bind {}", path.display()))?;
            eprintln!("listening on Unix socket {} (DISPLAY=:{})", path.display(), config.display);
            Some(listener)
        };

        Ok(Self {
            tcp,
            #[cfg(unix)]
            unix,
        })
    }

    #[cfg(unix)]
    async fn accept(&self) -> io::Result<Stream> {
        tokio::select! {
            conn = accept_tcp(self.tcp.as_ref()) => conn,
            conn = accept_unix(self.unix.as_ref()) => conn,
        }
    }

    #[cfg(not(unix))]
    async fn accept(&self) -> io::Result<Stream> {
        accept_tcp(self.tcp.as_ref()).await
    }
}

async fn accept_tcp(listener: Option<&TcpListener>) -> io::Result<Stream> {
    match listener {
        Some(l) => {
            let (stream, _) = l.accept().await?;
            stream.set_nodelay(true)?;
            Ok(Stream::Tcp(stream))
        }
        None => std::future::pending().await,
    }
}

#[cfg(unix)]
async fn accept_unix(listener: Option<&UnixListener>) -> io::Result<Stream> {
    match listener {
        Some(l) => {
            let (stream, _) = l.accept().await?;
            Ok(Stream::Unix(stream))
        }
        None => std::future::pending().await,
    }
}

/// The left pointer from the cursor font, black on white.
fn default_cursor(objects: &mut Registry, fonts: &FontTable, id: u32) -> Result<Handle> {
    let face = fonts
        .find(b"cursor")
        .map(|i| fonts.face(i))
        .context("cursor font missing")?;
    let source = face.glyph(LEFT_PTR).context("cursor font has no left_ptr")?;
    let cursor = glyph_cursor(objects, source, face.glyph(LEFT_PTR + 1), 0x000000, 0xffffff);
    Ok(objects.insert(id, None, ObjectKind::Cursor(cursor)))
}
