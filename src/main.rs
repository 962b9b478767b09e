use anyhow::Result;
use certbundle::{generate_ssl_data, hooks::{BuildEnv, PreActions}};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// The image the certificate archive is packed into.
const SPIFFS_TARGET: &str = "$BUILD_DIR/spiffs.bin";

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    // ─── 2) register hooks against the build environment ─────────────
    let env = BuildEnv::from_process();
    let mut hooks = PreActions::new();
    hooks.add_pre_action(&env, SPIFFS_TARGET, "generate_ssl_data", generate_ssl_data);

    let targets: Vec<&str> = hooks.targets().collect();
    info!(?targets, "current build targets");

    // ─── 3) run what precedes the SPIFFS image ───────────────────────
    let target = env.subst(SPIFFS_TARGET);
    let ran = hooks.run(&target, &[], &env)?;
    info!(%target, actions = ran, "pre-actions done");
    Ok(())
}
