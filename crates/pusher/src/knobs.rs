use std::{
    fmt::Debug,
    str::FromStr,
    sync::LazyLock,
};

/// Read a tunable from the environment, falling back to `default` when the
/// variable is unset or unparseable.
pub fn env_config<T: Debug + FromStr>(name: &str, default: T) -> T
where
    <T as FromStr>::Err: Debug,
{
    let var_s = match std::env::var(name) {
        Ok(s) => s,
        Err(std::env::VarError::NotPresent) => return default,
        Err(std::env::VarError::NotUnicode(..)) => {
            tracing::warn!("Invalid value for {name}, falling back to {default:?}.");
            return default;
        },
    };
    match T::from_str(&var_s) {
        Ok(v) => {
            tracing::info!("Overriding {name} to {v:?} from environment");
            v
        },
        Err(e) => {
            tracing::warn!("Invalid value {var_s} for {name}, falling back to {default:?}: {e:?}");
            default
        },
    }
}

/// Capacity of each client's downstream channel. Sends block when a
/// consumer falls this far behind, pausing the fan-out (and therefore the
/// whole worker loop) until the client drains.
pub static DOWNSTREAM_BUFFER_SIZE: LazyLock<usize> =
    LazyLock::new(|| env_config("RELAY_DOWNSTREAM_BUFFER_SIZE", 128));
