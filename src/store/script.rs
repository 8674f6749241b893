use crate::errors::{RateLimitError, Result};
use redis::{AsyncCommands, Script};
use tracing::debug;

const FIXED_WINDOW_LUA: &str = include_str!("../../scripts/fixed_window.lua");
const TOKEN_BUCKET_LUA: &str = include_str!("../../scripts/token_bucket.lua");

/// Script implementing the fixed-window `increment` primitive.
pub fn fixed_window_script() -> Script {
    Script::new(FIXED_WINDOW_LUA)
}

/// Script implementing the token-bucket `take_token` primitive.
pub fn token_bucket_script() -> Script {
    Script::new(TOKEN_BUCKET_LUA)
}

/// Register both Lua scripts with Redis so later calls hit the SHA cache.
pub async fn load_scripts<C: AsyncCommands>(conn: &mut C) -> Result<()> {
    for (name, script) in [
        ("fixed_window", fixed_window_script()),
        ("token_bucket", token_bucket_script()),
    ] {
        let sha = script
            .prepare_invoke()
            .load_async(conn)
            .await
            .map_err(|e| {
                RateLimitError::ScriptExecution(format!("failed to load {} script: {}", name, e))
            })?;
        debug!("loaded {} script (SHA: {})", name, sha);
    }

    Ok(())
}
