use std::sync::Once;

static INIT: Once = Once::new();

fn build_logger(finish: impl FnOnce(&mut env_logger::Builder)) {
    INIT.call_once(|| {
        finish(
            env_logger::Builder::from_env(
                env_logger::Env::default()
                    .filter_or("RUST_LOG", "warn")
                    .write_style_or("RUST_LOG_STYLE", "auto"),
            )
            .format_timestamp(None),
        );
    });
}

pub fn init() {
    build_logger(|env| {
        let _ = env.try_init();
    });
}

#[cfg(test)]
pub fn init_for_tests() {
    build_logger(|env| {
        let _ = env.is_test(true).try_init();
    });
}
