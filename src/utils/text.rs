/// Round to the nearest whole currency unit. Display only; internal
/// comparisons always use the unrounded value.
pub fn format_money(value: f64) -> String {
    format!("{:.0}", value)
}

pub fn format_percent(value: f64) -> String {
    format!("{:+.1}%", value)
}
