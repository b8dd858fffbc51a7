use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

const DIRECTIVE_START: u8 = 0;
const DIRECTIVE_IDLE: u8 = 1;
const DIRECTIVE_STOP: u8 = 2;

const IDLE_DATA: &str = r#"{"worker":{"baseInfo":{"index":0}},"shouldRunCase":false,"shouldStopCase":false}"#;
const STOP_DATA: &str = r#"{"worker":{"baseInfo":{"index":0}},"shouldRunCase":false,"shouldStopCase":true}"#;

struct StubState {
    directive: AtomicU8,
    start_data: String,
    status_bodies: Mutex<Vec<String>>,
    metric_bodies: Mutex<Vec<String>>,
}

/// In-process coordinator double: serves one start directive, then no-ops
/// until a stop is requested, and records every request body it sees.
pub struct StubCoordinator {
    state: Arc<StubState>,
    shutdown: mpsc::Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Drop for StubCoordinator {
    fn drop(&mut self) {
        let _send_result = self.shutdown.send(());
        if let Some(handle) = self.thread.take() {
            drop(handle.join());
        }
    }
}

impl StubCoordinator {
    /// Makes every subsequent status push carry the stop directive.
    pub fn request_stop(&self) {
        self.state.directive.store(DIRECTIVE_STOP, Ordering::Relaxed);
    }

    pub fn status_bodies(&self) -> Vec<String> {
        self.state
            .status_bodies
            .lock()
            .map(|bodies| bodies.clone())
            .unwrap_or_default()
    }

    pub fn metric_bodies(&self) -> Vec<String> {
        self.state
            .metric_bodies
            .lock()
            .map(|bodies| bodies.clone())
            .unwrap_or_default()
    }
}

/// Spawn a stub coordinator for tests.
///
/// `start_data` is the JSON served as the `data` member of the first status
/// response, typically a start directive with a case assignment.
///
/// # Errors
///
/// Returns an error if the listener cannot be created or configured.
pub fn spawn_stub_coordinator(start_data: &str) -> Result<(String, StubCoordinator), String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|err| format!("bind stub coordinator failed: {}", err))?;
    let addr = listener
        .local_addr()
        .map_err(|err| format!("stub coordinator addr failed: {}", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| format!("set_nonblocking failed: {}", err))?;

    let state = Arc::new(StubState {
        directive: AtomicU8::new(DIRECTIVE_START),
        start_data: start_data.to_owned(),
        status_bodies: Mutex::new(Vec::new()),
        metric_bodies: Mutex::new(Vec::new()),
    });
    let (shutdown_tx, shutdown_rx) = mpsc::channel();

    let accept_state = Arc::clone(&state);
    let handle = thread::spawn(move || {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }
            match listener.accept() {
                Ok((stream, _)) => {
                    let state = Arc::clone(&accept_state);
                    thread::spawn(move || handle_client(stream, &state));
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(_) => break,
            }
        }
    });

    Ok((
        format!("http://{}", addr),
        StubCoordinator {
            state,
            shutdown: shutdown_tx,
            thread: Some(handle),
        },
    ))
}

fn handle_client(stream: TcpStream, state: &StubState) {
    let Some((path, body)) = read_request(&stream) else {
        return;
    };

    let response_body = if path.ends_with("/worker/push_status") {
        if let Ok(mut bodies) = state.status_bodies.lock() {
            bodies.push(body);
        }
        let data = match state.directive.compare_exchange(
            DIRECTIVE_START,
            DIRECTIVE_IDLE,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => state.start_data.as_str(),
            Err(DIRECTIVE_STOP) => STOP_DATA,
            Err(_) => IDLE_DATA,
        };
        format!(r#"{{"code":0,"data":{},"msg":"ok"}}"#, data)
    } else if path.ends_with("/worker/send_step_metrics") {
        if let Ok(mut bodies) = state.metric_bodies.lock() {
            bodies.push(body);
        }
        r#"{"code":0,"msg":"ok"}"#.to_owned()
    } else {
        r#"{"code":1,"msg":"unknown endpoint"}"#.to_owned()
    };

    write_response(stream, &response_body);
}

fn read_request(stream: &TcpStream) -> Option<(String, String)> {
    drop(stream.set_read_timeout(Some(Duration::from_secs(5))));
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;
    let path = request_line.split_whitespace().nth(1)?.to_owned();

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).ok()?;
        let trimmed = header.trim();
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':')
            && name.eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse().ok()?;
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).ok()?;
    Some((path, String::from_utf8_lossy(&body).into_owned()))
}

fn write_response(mut stream: TcpStream, body: &str) {
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    if stream.write_all(response.as_bytes()).is_err() {
        return;
    }
    if stream.flush().is_err() {
        return;
    }
    drop(stream.shutdown(Shutdown::Both));
}
