use clap::Args as ClapArgs;

const DEFAULT_REPORT_URL: &str = "https://automate.adjust.com";
const DEFAULT_SLACK_URL: &str = "https://slack.com";
const DEFAULT_CHANNEL: &str = "C0A02F1CBSB";
const OUTPUT_DIR: &str = "./";

#[derive(ClapArgs)]
pub struct Config {
    #[arg(long, default_value = DEFAULT_REPORT_URL, env = "ADJUST_BASE_URL")]
    pub(crate) report_base_url: String,

    #[arg(long, env = "ADJUST_TOKEN")]
    pub(crate) report_token: String,

    #[arg(long, default_value = DEFAULT_SLACK_URL, env = "SLACK_BASE_URL")]
    pub(crate) slack_base_url: String,

    #[arg(long, env = "SLACK_TOKEN")]
    pub(crate) slack_token: String,

    #[arg(long, default_value = DEFAULT_CHANNEL, env = "SLACK_CHANNEL")]
    pub(crate) slack_channel: String,

    #[arg(long, default_value_t = 7, env = "DAYS", value_parser = clap::value_parser!(u32).range(1..))]
    pub(crate) days: u32,

    #[arg(long, default_value = OUTPUT_DIR, env = "OUTPUT_DIR")]
    pub(crate) output_dir: String,
}
