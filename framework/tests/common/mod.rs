#![allow(dead_code)]

use framework::{ConnectionHandler, Server, ServerConfiguration, ShutdownHandle};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const CONNECT_DEADLINE: Duration = Duration::from_secs(5);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A port whose successor is free too.
pub fn free_port_pair() -> u16 {
    loop {
        let probe = TcpListener::bind((LOCALHOST, 0)).unwrap();
        let port = probe.local_addr().unwrap().port();
        if port < u16::MAX && TcpListener::bind((LOCALHOST, port + 1)).is_ok() {
            return port;
        }
    }
}

pub fn test_config(name: &str) -> ServerConfiguration {
    ServerConfiguration::new(free_port_pair(), name)
        .unwrap()
        .with_listen_address(LOCALHOST)
        .with_poll_interval(Duration::from_millis(20))
}

pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "framework-it-{}-{name}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub struct RunningServer {
    pub port: u16,
    pub shutdown_port: u16,
    pub handle: ShutdownHandle,
    pub thread: JoinHandle<framework::Result<()>>,
}

impl RunningServer {
    pub fn start(server: Server) -> Self {
        let port = server.identity().listen_port();
        let shutdown_port = server.identity().shutdown_port();
        let handle = server.shutdown_handle();
        let thread = thread::spawn(move || server.start());

        Self {
            port,
            shutdown_port,
            handle,
            thread,
        }
    }

    pub fn spawn(
        config: ServerConfiguration,
        handler: impl ConnectionHandler,
    ) -> Self {
        Self::start(Server::new(config, handler).unwrap())
    }

    pub fn connect(&self) -> Client {
        Client::new(connect_with_retry(SocketAddr::new(LOCALHOST, self.port)))
    }

    /// Connects to the shutdown port without sending anything.
    pub fn trigger_shutdown(&self) {
        drop(connect_with_retry(SocketAddr::new(
            LOCALHOST,
            self.shutdown_port,
        )));
    }

    pub fn join(self) -> framework::Result<()> {
        self.thread.join().expect("server thread panicked")
    }
}

pub fn connect_with_retry(addr: SocketAddr) -> TcpStream {
    let deadline = Instant::now() + CONNECT_DEADLINE;
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => return stream,
            Err(_) if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => panic!("could not connect to {addr}: {e}"),
        }
    }
}

pub fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + CONNECT_DEADLINE;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

pub struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    pub fn new(stream: TcpStream) -> Self {
        stream
            .set_read_timeout(Some(CONNECT_DEADLINE))
            .unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        Self {
            reader,
            writer: stream,
        }
    }

    pub fn send(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.writer, "{line}")?;
        self.writer.flush()
    }

    pub fn recv(&mut self) -> io::Result<String> {
        let mut line = String::new();
        self.reader.read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    pub fn round_trip(&mut self, line: &str) -> io::Result<String> {
        self.send(line)?;
        self.recv()
    }
}
