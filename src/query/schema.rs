//! Database schema description served to the model via the
//! `get_database_schema` tool.

const DATABASE_SCHEMA: &str = "\
Schema: fretcoach

Table: fretcoach.sessions (practice session telemetry, one row per session)
  session_id            SERIAL PRIMARY KEY
  user_id               TEXT
  start_timestamp       TIMESTAMP
  end_timestamp         TIMESTAMP
  pitch_accuracy        DOUBLE PRECISION  -- 0-100
  scale_conformity      DOUBLE PRECISION  -- 0-100
  timing_stability      DOUBLE PRECISION  -- 0-100
  scale_chosen          TEXT              -- e.g. 'A minor'
  scale_type            TEXT              -- e.g. 'natural minor'
  sensitivity           DOUBLE PRECISION
  strictness            DOUBLE PRECISION
  total_notes_played    INTEGER
  correct_notes_played  INTEGER
  bad_notes_played      INTEGER
  total_inscale_notes   INTEGER
  duration_seconds      INTEGER
  ambient_light_option  TEXT
  created_at            TIMESTAMP DEFAULT now()

Table: fretcoach.ai_practice_plans (generated coaching plans)
  practice_id           UUID PRIMARY KEY
  user_id               TEXT
  generated_at          TIMESTAMP DEFAULT now()
  practice_plan         TEXT              -- plan JSON
  executed_session_id   TEXT              -- session the plan was used in
  created_at            TIMESTAMP DEFAULT now()

Only SELECT statements are accepted. Rows are restricted to the current user.";

pub fn database_schema() -> &'static str {
    DATABASE_SCHEMA
}
