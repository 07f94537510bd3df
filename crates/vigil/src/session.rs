//! The file-transfer session.
//!
//! A [`Session`] owns the control channel, the data channel and the file of
//! the active transfer. It never blocks on input: every call to
//! [`Session::tick`] consumes at most one command line and moves at most one
//! transfer chunk, so the session can share its task with nothing else and
//! still be suspended between two ticks.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use log::{debug, info, warn};

use crate::clock::Clock;
use crate::command::{Command, Verb};
use crate::config::ServerConfig;
use crate::net::{Connection, Network};
use crate::path::resolve;
use crate::reply::Reply;
use crate::storage::{File, OpenMode, Storage};
use crate::transfer::{CHUNK_SIZE, Direction, Progress, Transfer};

/// Longest accepted control line, terminator included.
pub const MAX_LINE_LENGTH: usize = 512;

// Bytes read from the control channel at once.
const READ_SIZE: usize = 128;

const LISTING_DATE: &str = "01-01-2000  00:00AM";
const LISTING_MODIFY: &str = "20210101000000";

/// Connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    /// Releases the current connection.
    Reset,
    /// Clears the session before greeting.
    WaitConnection,
    /// Waits for a control connection to greet.
    Idle,
    /// Waits for `USER`.
    WaitUsername,
    /// Waits for `PASS`.
    WaitPassword,
    /// Logged in, waits for commands.
    WaitCommand,
}

/// Kind of the active transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// No transfer.
    None,
    /// A file is being sent to the client.
    Retrieve,
    /// A file is being received from the client.
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// A file-transfer session.
pub struct Session<N, S, C>
where
    N: Network,
    S: Storage,
    C: Clock,
{
    config: ServerConfig,
    network: N,
    storage: S,
    clock: C,
    state: State,
    control: Option<N::Connection>,
    data: Option<N::Connection>,
    transfer: Option<Transfer<S::File>>,
    cwd: String,
    rename_from: Option<String>,
    last_command: Option<Command>,
    deadline_ms: u64,
    input: Vec<u8>,
    chunk: Box<[u8]>,
}

impl<N, S, C> Session<N, S, C>
where
    N: Network,
    S: Storage,
    C: Clock,
{
    /// Creates a [`Session`] waiting for its first control connection.
    pub fn new(config: ServerConfig, network: N, storage: S, clock: C) -> Self {
        Self {
            config,
            network,
            storage,
            clock,
            state: State::Reset,
            control: None,
            data: None,
            transfer: None,
            cwd: String::from("/"),
            rename_from: None,
            last_command: None,
            deadline_ms: 0,
            input: Vec::with_capacity(MAX_LINE_LENGTH),
            chunk: alloc::vec![0; CHUNK_SIZE].into_boxed_slice(),
        }
    }

    /// Returns the connection state.
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Returns the kind of the active transfer.
    #[must_use]
    pub fn transfer_state(&self) -> TransferState {
        match self.transfer.as_ref().map(Transfer::direction) {
            None => TransferState::None,
            Some(Direction::Retrieve) => TransferState::Retrieve,
            Some(Direction::Store) => TransferState::Store,
        }
    }

    /// Returns the working directory.
    #[must_use]
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    /// Returns the last accepted command.
    #[must_use]
    pub const fn last_command(&self) -> Option<&Command> {
        self.last_command.as_ref()
    }

    /// Returns the pending rename source, if any.
    #[must_use]
    pub fn rename_source(&self) -> Option<&str> {
        self.rename_from.as_deref()
    }

    /// Returns the absolute time, in milliseconds, after which the session
    /// times out.
    #[must_use]
    pub const fn deadline_ms(&self) -> u64 {
        self.deadline_ms
    }

    /// Returns the shared storage.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Advances the session by one step.
    pub fn tick(&mut self) {
        if self.state > State::Idle && self.clock.now_ms() > self.deadline_ms {
            warn!("Session timed out in state {:?}", self.state);
            self.abort_transfer();
            self.reply(&Reply::new(530, "Timeout"));
            self.state = State::Reset;
            return;
        }

        if self.transfer.is_some() {
            self.service_transfer();
            return;
        }

        if let Some(connection) = self.network.accept_control() {
            self.attach(connection);
        }

        match self.state {
            State::Reset => {
                self.release();
                self.state = State::WaitConnection;
            }
            State::WaitConnection => {
                self.abort_transfer();
                self.cwd = String::from("/");
                self.rename_from = None;
                self.state = State::Idle;
            }
            State::Idle => {
                if self.control_connected() {
                    self.greet();
                    self.deadline_ms = self
                        .clock
                        .now_ms()
                        .saturating_add(self.config.login_timeout_ms);
                    self.state = State::WaitUsername;
                }
            }
            State::WaitUsername => self.login_step(Verb::User),
            State::WaitPassword => self.login_step(Verb::Pass),
            State::WaitCommand => {
                if let Some(command) = self.next_command() {
                    match self.dispatch(&command) {
                        Flow::Continue => self.rearm(),
                        Flow::Close => self.state = State::Reset,
                    }
                } else if !self.control_connected() {
                    info!("Client disconnected");
                    self.state = State::Reset;
                }
            }
        }
    }

    /// Releases every connection and open file.
    pub fn shutdown(&mut self) {
        self.release();
        self.state = State::Reset;
    }

    fn attach(&mut self, connection: N::Connection) {
        if self.control.is_some() {
            info!("New control connection, releasing the current one");
            self.release();
        } else {
            info!("New control connection");
        }
        self.control = Some(connection);
        self.state = State::WaitConnection;
    }

    // Aborts any transfer and closes both channels.
    fn release(&mut self) {
        self.abort_transfer();
        self.close_data();
        if let Some(mut control) = self.control.take() {
            if control.is_connected() {
                if let Err(e) = control.write_all(Reply::new(221, "Goodbye").to_wire().as_bytes()) {
                    debug!("Cannot say goodbye: {e}");
                }
            }
            control.close();
            info!("Control connection closed");
        }
        self.input.clear();
        self.rename_from = None;
        self.last_command = None;
    }

    fn greet(&mut self) {
        let banner = Reply::multiline(
            220,
            [
                String::from("--- Welcome to the vigil storage service ---"),
                format!("--- version {} ---", env!("CARGO_PKG_VERSION")),
                String::from("Service ready"),
            ],
        );
        self.reply(&banner);
        info!("Client greeted");
    }

    fn login_step(&mut self, expected: Verb) {
        let Some(command) = self.next_command() else {
            if !self.control_connected() {
                info!("Client disconnected before logging in");
                self.state = State::Reset;
            }
            return;
        };

        if command.verb() == Verb::Auth {
            self.reply(&Reply::new(530, "Please login with USER and PASS"));
            return;
        }

        if command.verb() != expected {
            warn!("Unexpected {} before login", command.name());
            self.reply(&Reply::new(500, "Syntax error, login required"));
            self.state = State::Reset;
            return;
        }

        match expected {
            Verb::User if command.argument() == self.config.username => {
                self.reply(&Reply::new(331, "OK. Password required"));
                self.state = State::WaitPassword;
            }
            Verb::User => {
                warn!("Unknown user {}", command.argument());
                self.reply(&Reply::new(530, "User not found"));
                self.state = State::Reset;
            }
            _ if command.argument() == self.config.password => {
                info!("User {} logged in", self.config.username);
                self.reply(&Reply::new(230, "OK."));
                self.cwd = String::from("/");
                self.rearm();
                self.state = State::WaitCommand;
            }
            _ => {
                warn!("Wrong password");
                self.reply(&Reply::new(530, "Login incorrect"));
                self.state = State::Reset;
            }
        }
    }

    fn dispatch(&mut self, command: &Command) -> Flow {
        let argument = command.argument();
        match command.verb() {
            Verb::Quit => return Flow::Close,
            Verb::Pwd => self.print_directory(),
            Verb::Cwd if argument.is_empty() => {
                self.reply(&Reply::new(501, "No directory name given"));
            }
            Verb::Cwd if argument == "." => self.print_directory(),
            Verb::Cwd => self.change_directory(argument),
            Verb::Cdup => self.change_directory(".."),
            Verb::Mkd => self.make_directory(argument),
            Verb::Rmd => self.remove(argument, true),
            Verb::Dele => self.remove(argument, false),
            Verb::Rnfr => self.rename_from(argument),
            Verb::Rnto => self.rename_to(argument),
            Verb::List => self.list(argument, false),
            Verb::Mlsd => self.list(argument, true),
            Verb::Retr => self.retrieve(argument),
            Verb::Stor => self.store(argument),
            Verb::Pasv => self.passive(),
            Verb::Type => self.transfer_type(argument),
            Verb::Mode if argument.eq_ignore_ascii_case("S") => {
                self.reply(&Reply::new(200, "S Ok"));
            }
            Verb::Mode => self.reply(&Reply::new(504, "Only S(tream) is supported")),
            Verb::Stru if argument.eq_ignore_ascii_case("F") => {
                self.reply(&Reply::new(200, "F Ok"));
            }
            Verb::Stru => self.reply(&Reply::new(504, "Only F(ile) is supported")),
            Verb::Feat => {
                self.reply(&Reply::multiline(
                    211,
                    ["Extensions supported:", " MLSD", "End."],
                ));
            }
            Verb::Syst => self.reply(&Reply::new(215, "UNIX Type: L8")),
            Verb::Noop => self.reply(&Reply::new(200, "Zzz...")),
            Verb::Abor => {
                self.abort_transfer();
                self.reply(&Reply::new(226, "Data connection closed"));
            }
            Verb::Auth => self.reply(&Reply::new(530, "Encryption is not supported")),
            Verb::User | Verb::Pass | Verb::Unknown => {
                warn!("Unsupported command {}", command.name());
                self.reply(&Reply::new(500, "Unknown command"));
            }
        }
        Flow::Continue
    }

    fn print_directory(&mut self) {
        self.reply(&Reply::new(
            257,
            format!("\"{}\" is your current directory", self.cwd),
        ));
    }

    fn change_directory(&mut self, target: &str) {
        self.cwd = resolve(&self.cwd, target);
        debug!("Working directory is now {}", self.cwd);
        self.reply(&Reply::new(
            250,
            format!("Ok. Current directory is {}", self.cwd),
        ));
    }

    fn make_directory(&mut self, argument: &str) {
        if argument.is_empty() {
            self.reply(&Reply::new(501, "No directory name given"));
            return;
        }

        let path = resolve(&self.cwd, argument);
        let reply = if self.storage.exists(&path) {
            Reply::new(553, format!("{path} already exists"))
        } else {
            match self.storage.mkdir(&path) {
                Ok(()) => Reply::new(257, format!("\"{path}\" created")),
                Err(e) => {
                    warn!("Cannot create {path}: {e}");
                    Reply::new(550, format!("Cannot create {path}"))
                }
            }
        };
        self.reply(&reply);
    }

    fn remove(&mut self, argument: &str, directory: bool) {
        if argument.is_empty() {
            self.reply(&Reply::new(501, "No file name given"));
            return;
        }

        let path = resolve(&self.cwd, argument);
        let reply = if !self.storage.exists(&path) {
            Reply::new(550, format!("{path} not found"))
        } else {
            let removed = if directory {
                self.storage.remove_dir(&path)
            } else {
                self.storage.remove_file(&path)
            };
            match removed {
                Ok(()) => {
                    info!("Removed {path}");
                    Reply::new(250, format!("Deleted {path}"))
                }
                Err(e) => {
                    warn!("Cannot remove {path}: {e}");
                    Reply::new(450, format!("Cannot delete {path}"))
                }
            }
        };
        self.reply(&reply);
    }

    fn rename_from(&mut self, argument: &str) {
        if argument.is_empty() {
            self.reply(&Reply::new(501, "No file name given"));
            return;
        }

        let path = resolve(&self.cwd, argument);
        if self.storage.exists(&path) {
            self.reply(&Reply::new(
                350,
                "RNFR accepted, file exists, ready for destination",
            ));
            self.rename_from = Some(path);
        } else {
            self.rename_from = None;
            self.reply(&Reply::new(550, format!("{path} not found")));
        }
    }

    fn rename_to(&mut self, argument: &str) {
        let source = self.rename_from.take();

        if argument.is_empty() {
            self.reply(&Reply::new(501, "No file name given"));
            return;
        }
        let Some(source) = source else {
            self.reply(&Reply::new(503, "Need RNFR before RNTO"));
            return;
        };

        let destination = resolve(&self.cwd, argument);
        let reply = if self.storage.exists(&destination) {
            Reply::new(553, format!("{destination} already exists"))
        } else {
            match self.storage.rename(&source, &destination) {
                Ok(()) => {
                    info!("Renamed {source} to {destination}");
                    Reply::new(250, "File successfully renamed or moved")
                }
                Err(e) => {
                    warn!("Cannot rename {source}: {e}");
                    Reply::new(451, "Rename/move failure")
                }
            }
        };
        self.reply(&reply);
    }

    fn transfer_type(&mut self, argument: &str) {
        let reply = match argument.to_ascii_uppercase().as_str() {
            "A" | "A N" => Reply::new(200, "TYPE is now ASCII"),
            "I" | "L 8" => Reply::new(200, "TYPE is now 8-bit binary"),
            _ => Reply::new(504, "Unknown TYPE"),
        };
        self.reply(&reply);
    }

    fn passive(&mut self) {
        self.close_data();
        let [a, b, c, d] = self.network.local_ip().octets();
        let port = self.config.data_port;
        debug!("Passive mode on {a}.{b}.{c}.{d}:{port}");
        self.reply(&Reply::new(
            227,
            format!(
                "Entering Passive Mode ({a},{b},{c},{d},{},{}).",
                port >> 8,
                port & 0xff
            ),
        ));
    }

    fn list(&mut self, argument: &str, machine: bool) {
        let dir = if argument.is_empty() || argument.starts_with('-') {
            self.cwd.clone()
        } else {
            resolve(&self.cwd, argument)
        };

        let entries = match self.storage.list(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list {dir}: {e}");
                self.reply(&Reply::new(550, format!("Cannot open directory {dir}")));
                return;
            }
        };

        if !self.connect_data() {
            self.reply(&Reply::new(425, "No data connection"));
            return;
        }
        self.reply(&Reply::new(150, "Accepted data connection"));

        let mut sent = 0;
        for entry in &entries {
            let line = match (machine, entry.is_dir) {
                (true, is_dir) => format!(
                    "Type={};Size={};modify={LISTING_MODIFY}; {}\r\n",
                    if is_dir { "dir" } else { "file" },
                    entry.size,
                    entry.name
                ),
                (false, true) => format!("{LISTING_DATE} <DIR> {}\r\n", entry.name),
                (false, false) => format!("{LISTING_DATE} {} {}\r\n", entry.size, entry.name),
            };
            let Some(peer) = self.data.as_mut() else {
                break;
            };
            if let Err(e) = peer.write_all(line.as_bytes()) {
                warn!("Listing of {dir} interrupted: {e}");
                break;
            }
            sent += 1;
        }
        self.close_data();

        let summary = format!("{sent} matches total");
        if machine {
            self.reply(&Reply::new(226, "options: -a -l").line(summary));
        } else {
            self.reply(&Reply::new(226, summary));
        }
    }

    fn retrieve(&mut self, argument: &str) {
        if argument.is_empty() {
            self.reply(&Reply::new(501, "No file name given"));
            return;
        }

        let path = resolve(&self.cwd, argument);
        if !self.storage.exists(&path) {
            self.reply(&Reply::new(550, format!("File {argument} not found")));
            return;
        }
        if self.storage.is_dir(&path) {
            self.reply(&Reply::new(450, format!("Cannot open {argument}")));
            return;
        }
        let file = match self.storage.open(&path, OpenMode::Read) {
            Ok(file) => file,
            Err(e) => {
                warn!("Cannot open {path}: {e}");
                self.reply(&Reply::new(450, format!("Cannot open {argument}")));
                return;
            }
        };

        if !self.connect_data() {
            self.reply(&Reply::new(425, "No data connection"));
            return;
        }

        let size = file.size();
        info!("Sending {path} ({size} bytes)");
        self.reply(
            &Reply::new(150, format!("Connected to port {}", self.config.data_port))
                .line(format!("{size} bytes to download")),
        );
        self.transfer = Some(Transfer::retrieve(file, path, self.clock.now_ms()));
    }

    fn store(&mut self, argument: &str) {
        if argument.is_empty() {
            self.reply(&Reply::new(501, "No file name given"));
            return;
        }

        let path = resolve(&self.cwd, argument);
        let file = match self.storage.open(&path, OpenMode::Write) {
            Ok(file) => file,
            Err(e) => {
                warn!("Cannot create {path}: {e}");
                self.reply(&Reply::new(451, format!("Cannot create or open {path}")));
                return;
            }
        };

        if !self.connect_data() {
            self.reply(&Reply::new(425, "No data connection"));
            return;
        }

        info!("Receiving {path}");
        self.reply(&Reply::new(
            150,
            format!("Connected to port {}", self.config.data_port),
        ));
        self.transfer = Some(Transfer::store(file, path, self.clock.now_ms()));
    }

    fn service_transfer(&mut self) {
        if !self.control_connected() {
            info!("Client disconnected during a transfer");
            self.abort_transfer();
            self.state = State::Reset;
            return;
        }

        let (Some(transfer), Some(peer)) = (self.transfer.as_mut(), self.data.as_mut()) else {
            self.abort_transfer();
            return;
        };

        let before = transfer.bytes();
        match transfer.step(peer, &self.storage, &mut self.chunk) {
            Progress::Continue => {
                if transfer.bytes() > before {
                    self.rearm();
                }
                if self.abort_requested() {
                    self.abort_transfer();
                    self.reply(&Reply::new(226, "Data connection closed"));
                    self.rearm();
                }
            }
            Progress::Complete => {
                let now = self.clock.now_ms();
                if let Some(transfer) = self.transfer.take() {
                    let reply = transfer.finish(now);
                    self.close_data();
                    self.reply(&reply);
                }
                self.rearm();
            }
            Progress::Failed(reply) => {
                self.transfer = None;
                self.close_data();
                self.reply(&reply);
                self.rearm();
            }
        }
    }

    fn abort_transfer(&mut self) {
        if let Some(transfer) = self.transfer.take() {
            let reply = transfer.abort();
            self.close_data();
            self.reply(&reply);
        }
    }

    // Waits for a data peer, dropping any stale one first.
    fn connect_data(&mut self) -> bool {
        if self
            .data
            .as_ref()
            .is_some_and(|peer| peer.is_connected())
        {
            return true;
        }
        self.close_data();

        let started = self.clock.now_ms();
        loop {
            if let Some(peer) = self.network.accept_data() {
                debug!("Data connection accepted");
                self.data = Some(peer);
                return true;
            }
            if self.clock.now_ms().saturating_sub(started) >= self.config.data_connect_timeout_ms {
                warn!("No data connection within {} ms", self.config.data_connect_timeout_ms);
                return false;
            }
            self.clock.pause();
        }
    }

    fn close_data(&mut self) {
        if let Some(mut peer) = self.data.take() {
            peer.close();
        }
    }

    fn control_connected(&self) -> bool {
        self.control
            .as_ref()
            .is_some_and(|control| control.is_connected())
    }

    fn rearm(&mut self) {
        self.deadline_ms = self
            .clock
            .now_ms()
            .saturating_add(self.config.idle_timeout_ms);
    }

    fn reply(&mut self, reply: &Reply) {
        let Some(control) = self.control.as_mut() else {
            return;
        };
        debug!("Reply {}", reply.code());
        if let Err(e) = control.write_all(reply.to_wire().as_bytes()) {
            warn!("Cannot send reply {}: {e}", reply.code());
        }
    }

    fn read_input(&mut self) {
        let Some(control) = self.control.as_mut() else {
            return;
        };
        let mut buf = [0; READ_SIZE];
        while self.input.len() <= MAX_LINE_LENGTH && !self.input.contains(&b'\n') {
            match control.read(&mut buf) {
                Ok(0) => break,
                Ok(read) => self.input.extend_from_slice(&buf[..read]),
                Err(e) => {
                    warn!("Cannot read the control channel: {e}");
                    break;
                }
            }
        }
    }

    // Returns the next complete line without consuming it.
    fn peek_line(&mut self) -> Option<(usize, Option<Command>)> {
        self.read_input();
        match self.input.iter().position(|byte| *byte == b'\n') {
            Some(end) => {
                let line = String::from_utf8_lossy(&self.input[..end]);
                Some((end, Command::parse(&line)))
            }
            None => {
                if self.input.len() > MAX_LINE_LENGTH {
                    warn!("Discarding an overlong control line");
                    self.input.clear();
                    self.reply(&Reply::new(500, "Line too long"));
                }
                None
            }
        }
    }

    fn next_command(&mut self) -> Option<Command> {
        loop {
            let (end, command) = self.peek_line()?;
            let _ = self.input.drain(..=end);
            if let Some(command) = command {
                info!("Command {} {}", command.name(), command.argument());
                self.last_command = Some(command.clone());
                return Some(command);
            }
        }
    }

    // Only ABOR is read while a transfer is active.
    fn abort_requested(&mut self) -> bool {
        match self.peek_line() {
            Some((end, Some(command))) if command.verb() == Verb::Abor => {
                let _ = self.input.drain(..=end);
                info!("Command ABOR during a transfer");
                self.last_command = Some(command);
                true
            }
            Some((end, None)) => {
                let _ = self.input.drain(..=end);
                false
            }
            _ => false,
        }
    }
}
