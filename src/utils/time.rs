use chrono::{DateTime, Local};

pub fn format_timestamp(time: DateTime<Local>) -> String {
    time.format("%Y-%m-%d %H:%M").to_string()
}

pub fn current_human_timestamp() -> String {
    format_timestamp(Local::now())
}
