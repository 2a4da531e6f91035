pub mod cron;
pub mod http_metric;
