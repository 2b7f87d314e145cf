pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  model TEXT NOT NULL,
  status TEXT NOT NULL,
  config_json TEXT,
  created_at TEXT NOT NULL,
  completed_at TEXT
);

CREATE TABLE IF NOT EXISTS results (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id TEXT NOT NULL REFERENCES runs(id),
  test_case_id TEXT NOT NULL,
  model_name TEXT NOT NULL,
  status TEXT NOT NULL,
  classification TEXT NOT NULL,
  raw_response TEXT,
  error TEXT,
  latency_ms INTEGER NOT NULL,
  attempt_count INTEGER NOT NULL,
  flag_count INTEGER NOT NULL DEFAULT 0,
  flags_json TEXT,
  created_at TEXT NOT NULL,
  UNIQUE(run_id, test_case_id)
);

CREATE INDEX IF NOT EXISTS idx_results_run ON results(run_id);
"#;
