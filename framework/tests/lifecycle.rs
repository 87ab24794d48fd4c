mod common;

use anyhow::{anyhow, Result};
use common::{init_logging, test_config, wait_until, RunningServer, LOCALHOST};
use crossbeam::channel::unbounded;
use framework::{EchoHandler, Server, ServerError};
use rstest::rstest;
use std::io::{BufRead, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[rstest]
#[case::silent("")]
#[case::with_payload("please stop\n")]
fn echo_then_shutdown_port_stops_server(#[case] payload: &str) {
    init_logging();
    let server = RunningServer::spawn(test_config("echo"), EchoHandler);
    let port = server.port;

    let mut client = server.connect();
    assert_eq!(client.round_trip("hello").unwrap(), "hello");
    drop(client);

    let mut trigger =
        common::connect_with_retry((LOCALHOST, server.shutdown_port).into());
    trigger.write_all(payload.as_bytes()).unwrap();
    drop(trigger);

    server.join().unwrap();
    assert!(TcpStream::connect((LOCALHOST, port)).is_err());
}

#[rstest]
#[case(1)]
#[case(4)]
#[case(16)]
fn every_client_is_dispatched_once_and_drained(#[case] clients: usize) {
    init_logging();
    let started = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let (release_tx, release_rx) = unbounded::<()>();

    let handler = {
        let started = Arc::clone(&started);
        let finished = Arc::clone(&finished);
        move |reader: &mut dyn BufRead, writer: &mut dyn Write| -> Result<()> {
            started.fetch_add(1, Ordering::SeqCst);
            let mut line = String::new();
            reader.read_line(&mut line)?;
            release_rx.recv()?;
            write!(writer, "{line}")?;
            finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    };

    let server = RunningServer::spawn(test_config("drain"), handler);
    let mut connections: Vec<_> = (0..clients)
        .map(|i| {
            let mut client = server.connect();
            client.send(&format!("client-{i}")).unwrap();
            client
        })
        .collect();

    assert!(wait_until(|| started.load(Ordering::SeqCst) == clients));
    server.trigger_shutdown();
    assert!(wait_until(|| server.handle.is_stopped()));

    thread::sleep(Duration::from_millis(100));
    assert!(!server.thread.is_finished(), "start returned before drain");
    assert_eq!(finished.load(Ordering::SeqCst), 0);

    for _ in 0..clients {
        release_tx.send(()).unwrap();
    }
    for (i, client) in connections.iter_mut().enumerate() {
        assert_eq!(client.recv().unwrap(), format!("client-{i}"));
    }

    server.join().unwrap();
    assert_eq!(started.load(Ordering::SeqCst), clients);
    assert_eq!(finished.load(Ordering::SeqCst), clients);
}

#[test]
fn simultaneous_clients_do_not_cross_talk() {
    init_logging();
    let server = RunningServer::spawn(test_config("pair"), EchoHandler);

    let workers: Vec<_> = ["alpha", "beta"]
        .into_iter()
        .map(|name| {
            let mut client = server.connect();
            thread::spawn(move || {
                for i in 0..20 {
                    let line = format!("{name}-{i}");
                    assert_eq!(client.round_trip(&line).unwrap(), line);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    server.trigger_shutdown();
    server.join().unwrap();
}

#[test]
fn pipelined_lines_come_back_in_order() {
    init_logging();
    let server = RunningServer::spawn(test_config("ordered"), EchoHandler);
    let mut first = server.connect();
    let mut second = server.connect();

    for i in 0..5 {
        first.send(&format!("a{i}")).unwrap();
        second.send(&format!("b{i}")).unwrap();
    }
    for i in 0..5 {
        assert_eq!(first.recv().unwrap(), format!("a{i}"));
        assert_eq!(second.recv().unwrap(), format!("b{i}"));
    }

    drop(first);
    drop(second);
    server.trigger_shutdown();
    server.join().unwrap();
}

#[test]
fn failing_handlers_do_not_affect_others() {
    init_logging();
    let handler =
        |reader: &mut dyn BufRead, writer: &mut dyn Write| -> Result<()> {
            let mut line = String::new();
            reader.read_line(&mut line)?;
            match line.trim() {
                "fail" => Err(anyhow!("client asked to fail")),
                "panic" => panic!("client asked to panic"),
                other => {
                    writeln!(writer, "{other}")?;
                    Ok(())
                }
            }
        };

    let server = Server::new(test_config("isolated"), handler).unwrap();
    let in_flight = server.in_flight();
    let server = RunningServer::start(server);

    let mut failing = server.connect();
    assert_eq!(failing.round_trip("fail").unwrap(), "");

    let mut panicking = server.connect();
    assert_eq!(panicking.round_trip("panic").unwrap(), "");

    let mut healthy = server.connect();
    assert_eq!(healthy.round_trip("still here").unwrap(), "still here");

    assert!(wait_until(|| in_flight.is_empty()));
    server.trigger_shutdown();
    server.join().unwrap();
    assert!(in_flight.is_empty());
}

#[test]
fn shutdown_handle_stops_server() {
    init_logging();
    let server = RunningServer::spawn(test_config("handle"), EchoHandler);
    let (port, shutdown_port) = (server.port, server.shutdown_port);

    let mut client = server.connect();
    assert_eq!(client.round_trip("up").unwrap(), "up");
    drop(client);

    assert!(server.handle.stop());
    server.join().unwrap();

    assert!(TcpStream::connect((LOCALHOST, port)).is_err());
    assert!(TcpStream::connect((LOCALHOST, shutdown_port)).is_err());
}

#[rstest]
#[case::listen_port(false)]
#[case::shutdown_port(true)]
fn occupied_port_is_a_bind_error(#[case] occupy_shutdown: bool) {
    init_logging();
    let config = test_config("busy");
    let port = if occupy_shutdown {
        config.shutdown_port
    } else {
        config.listen_port
    };
    let _occupier = TcpListener::bind((LOCALHOST, port)).unwrap();

    let err = Server::new(config, EchoHandler).unwrap().start().unwrap_err();
    assert!(
        matches!(err, ServerError::Bind { port: p, .. } if p == port),
        "unexpected error: {err}"
    );
}

#[test]
fn construction_rejects_equal_ports() {
    let config = test_config("same");
    let config = config.clone().with_shutdown_port(config.listen_port);

    assert!(matches!(
        Server::new(config, EchoHandler),
        Err(ServerError::Config(framework::ConfigError::InvalidPorts { .. }))
    ));
}
