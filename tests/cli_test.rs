// ABOUTME: End-to-end tests that drive the cron-replicator binary against a fixture source
// ABOUTME: Each test gets its own data directory so persisted documents never leak between tests

use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::thread;
use tempfile::{tempdir, TempDir};

const FIXTURE: &str = r#"{
  "databases": {
    "sales": {
      "tables": {
        "orders": {
          "columns": [
            {"name": "id", "data_type": "int", "is_identity": true},
            {"name": "status", "data_type": "varchar", "max_length": 20},
            {"name": "placed_at", "data_type": "datetime"}
          ],
          "key_columns": ["id"],
          "rows": [
            {"id": 1, "status": "open", "placed_at": "2024-01-05 10:00:00"},
            {"id": 2, "status": "closed", "placed_at": "2024-01-06 11:00:00"},
            {"id": 3, "status": "open", "placed_at": "2024-02-01 09:30:00"}
          ]
        }
      }
    },
    "hr": {"tables": {}}
  }
}"#;

struct Workspace {
    dir: TempDir,
    fixture: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let fixture = dir.path().join("fixture.json");
        fs::write(&fixture, FIXTURE).unwrap();
        Self { dir, fixture }
    }

    fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    fn run(&self, args: &[&str]) -> Output {
        self.run_with_ingest(args, "http://127.0.0.1:9")
    }

    fn run_with_ingest(&self, args: &[&str], ingest_url: &str) -> Output {
        Command::new(env!("CARGO_BIN_EXE_cron-replicator"))
            .args(args)
            .arg("--fixture")
            .arg(&self.fixture)
            .arg("--data-dir")
            .arg(self.data_dir())
            .arg("--ingest-url")
            .arg(ingest_url)
            .current_dir(self.dir.path())
            .env("HOME", self.dir.path())
            .env_remove("RUST_LOG")
            .env_remove("REPLICATOR_CONFIG")
            .env_remove("REPLICATOR_MODE")
            .env_remove("SOURCE_DATABASE_URL")
            .env_remove("INGEST_API_KEY")
            .env_remove("SYNC_BATCH_SIZE")
            .env_remove("HTTP_PROXY")
            .env_remove("http_proxy")
            .env_remove("ALL_PROXY")
            .env_remove("all_proxy")
            .output()
            .expect("Failed to execute command")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

/// Answer one ingestion request with a success body, returning the request body.
fn serve_once(listener: TcpListener) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let (header_end, content_length) = loop {
            let n = stream.read(&mut chunk).unwrap();
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                let length = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .map(|v| v.trim().parse::<usize>().unwrap())
                    .unwrap_or(0);
                break (pos + 4, length);
            }
        };
        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).unwrap();
            buf.extend_from_slice(&chunk[..n]);
        }

        let body = r#"{"code":200,"msg":"ok","table":"orders"}"#;
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).unwrap();
        String::from_utf8_lossy(&buf[header_end..]).to_string()
    })
}

#[test]
fn test_browse_commands() {
    let ws = Workspace::new();

    let output = ws.run(&["databases"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output).lines().collect::<Vec<_>>(), vec!["hr", "sales"]);

    let output = ws.run(&["tables", "--db", "sales"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "orders");

    let output = ws.run(&["tables", "--db", "hr"]);
    assert!(stdout(&output).contains("No tables found in database \"hr\"."));

    let output = ws.run(&["preview", "--db", "sales", "--table", "orders", "--limit", "2", "--json"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let rows: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 2);
    assert_eq!(rows[0]["status"], "open");

    let output = ws.run(&["preview", "--db", "sales", "--table", "refunds"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Table \"refunds\" does not exist in database \"sales\"."));
}

#[test]
fn test_filters_round_trip_through_data_dir() {
    let ws = Workspace::new();
    let filters = r#"[{"column":"status","operator":"eq","value":"open"}]"#;

    let output = ws.run(&["filters", "set", "--db", "sales", "--table", "orders", "--json", filters]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Saved 1 filter(s) for sales.orders"));

    let stored = read_json(&ws.data_dir().join("filters.json"));
    assert_eq!(stored["sales_orders"][0]["column"], "status");

    let output = ws.run(&["filters", "get", "--db", "sales", "--table", "orders"]);
    let listed: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(listed[0]["value"], "open");

    let output = ws.run(&["filters", "clear", "--db", "sales", "--table", "orders"]);
    assert!(output.status.success());
    let output = ws.run(&["filters", "get", "--db", "sales", "--table", "orders"]);
    assert_eq!(stdout(&output).trim(), "[]");

    let output = ws.run(&[
        "filters", "set", "--db", "sales", "--table", "orders", "--json",
        r#"[{"column":"status","operator":"like","value":"o%"}]"#,
    ]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid filters"));
}

#[test]
fn test_schedule_lifecycle() {
    let ws = Workspace::new();
    let schedule_file = ws.data_dir().join("schedule.json");

    let output = ws.run(&[
        "schedule", "set", "--cron", "0 3 * * *", "--tables", "sales.orders,sales.orders",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Schedule set: 0 3 * * *"));
    assert_eq!(out.matches("local)").count(), 2);

    let stored = read_json(&schedule_file);
    assert_eq!(stored["cronExpression"], "0 3 * * *");
    assert_eq!(stored["selectedTables"].as_array().unwrap().len(), 1);
    assert_eq!(stored["selectedTables"][0]["dbName"], "sales");

    let output = ws.run(&["schedule", "pause"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(read_json(&schedule_file)["paused"], true);

    let output = ws.run(&["schedule", "show", "--count", "3"]);
    let out = stdout(&output);
    assert!(out.contains("Paused:     yes"));
    assert!(out.contains("  sales.orders"));
    assert_eq!(out.matches("local)").count(), 3);

    let output = ws.run(&["schedule", "resume"]);
    assert!(output.status.success());
    assert_eq!(read_json(&schedule_file)["paused"], false);

    let output = ws.run(&["schedule", "set", "--cron", "not a cron", "--tables", "sales.orders"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid CRON expression"));
    assert!(!schedule_file.exists());

    let output = ws.run(&["schedule", "pause"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("No schedule is configured."));

    let output = ws.run(&["schedule", "set", "--cron", "*/15 * * * *", "--tables", "sales.orders"]);
    assert!(output.status.success());
    let output = ws.run(&["schedule", "clear"]);
    assert!(stdout(&output).contains("Schedule cleared."));
    assert!(!schedule_file.exists());
}

#[test]
fn test_manual_sync_is_logged() {
    let ws = Workspace::new();
    let output = ws.run(&["logs"]);
    assert!(stdout(&output).contains("No sync runs recorded yet."));

    let output = ws.run(&[
        "filters", "set", "--db", "sales", "--table", "orders", "--json",
        r#"[{"column":"status","operator":"eq","value":"open"}]"#,
    ]);
    assert!(output.status.success());

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let ingest_url = format!("http://{}", listener.local_addr().unwrap());
    let server = serve_once(listener);

    let output = ws.run_with_ingest(&["sync", "--db", "sales", "--table", "orders"], &ingest_url);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Synced 2 rows for table \"orders\"."));

    let request: serde_json::Value = serde_json::from_str(&server.join().unwrap()).unwrap();
    assert_eq!(request["table_name"], "orders");
    assert_eq!(request["unique_keys"], serde_json::json!(["id"]));
    assert_eq!(request["table_items"].as_array().unwrap().len(), 2);

    let output = ws.run(&["logs", "--json"]);
    let entries: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(entries[0]["dbName"], "sales");
    assert_eq!(entries[0]["status"], "success");
    assert_eq!(entries[0]["synced"], 2);

    let output = ws.run(&["logs"]);
    assert!(stdout(&output).contains("sales.orders  rows=2"));
}

#[test]
fn test_sync_failure_is_logged() {
    let ws = Workspace::new();
    let output = ws.run(&["sync", "--db", "sales", "--table", "refunds"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Table \"refunds\" does not exist in database \"sales\"."));

    let entries = read_json(&ws.data_dir().join("logs.json"));
    assert_eq!(entries[0]["status"], "error");
    assert_eq!(entries[0]["tableName"], "refunds");
}
