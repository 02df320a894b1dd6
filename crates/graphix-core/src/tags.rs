#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub key: &'static str,
    pub metric: &'static str,
    pub help: &'static str,
}

pub const PRESSURE_PA: Tag = Tag {
    key: "pressure_pa",
    metric: "graphix_pressure_pascals",
    help: "Pressure gauge value in pascals",
};

pub const PRESSURE_TIMESTAMP: Tag = Tag {
    key: "pressure_timestamp",
    metric: "graphix_pressure_timestamp_seconds",
    help: "Unix time at which the exposed pressure value was acquired",
};

pub const SCRAPER_STATUS: Tag = Tag {
    key: "status",
    metric: "graphix_scraper_status",
    help: "Scraper status (1 for the current state)",
};

pub const SCRAPES_TOTAL: Tag = Tag {
    key: "scrapes",
    metric: "graphix_scrapes_total",
    help: "Scrape ticks executed against the gauge controller",
};

pub const SCRAPE_FAILURES: Tag = Tag {
    key: "kind",
    metric: "graphix_scrape_failures_total",
    help: "Failed scrape ticks by failure kind",
};

pub const EXPORTER_INFO: Tag = Tag {
    key: "info",
    metric: "graphix_exporter_info",
    help: "Program information",
};
