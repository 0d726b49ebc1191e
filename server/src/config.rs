use std::env;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub tick_rate_hz: u32,
    /// How often the replicated room state is flushed to clients
    pub broadcast_rate_hz: u32,
    pub rng_seed: u64,
    /// Concurrent WebSocket connections accepted
    pub max_connections: usize,
    /// Stat deltas buffered for the persistence task before new ones are dropped
    pub persist_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9002".to_string(),
            tick_rate_hz: 60,
            broadcast_rate_hz: 15,
            rng_seed: 42,
            max_connections: 256,
            persist_queue: 1024,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `BLITZ_LISTEN_ADDR`, `BLITZ_TICK_RATE_HZ` and `BLITZ_RNG_SEED`.
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();
        if let Ok(addr) = env::var("BLITZ_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Ok(rate) = env::var("BLITZ_TICK_RATE_HZ") {
            config.tick_rate_hz = rate
                .parse()
                .map_err(|e| format!("BLITZ_TICK_RATE_HZ={}: {}", rate, e))?;
        }
        if let Ok(seed) = env::var("BLITZ_RNG_SEED") {
            config.rng_seed = seed
                .parse()
                .map_err(|e| format!("BLITZ_RNG_SEED={}: {}", seed, e))?;
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tick_rate_hz == 0 {
            return Err("tick_rate_hz must be > 0".to_string());
        }
        if self.broadcast_rate_hz == 0 || self.broadcast_rate_hz > self.tick_rate_hz {
            return Err("broadcast_rate_hz must be in 1..=tick_rate_hz".to_string());
        }
        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }
        if self.persist_queue == 0 {
            return Err("persist_queue must be > 0".to_string());
        }
        Ok(())
    }

    /// Ticks between two state flushes.
    pub fn broadcast_every_n(&self) -> u64 {
        (self.tick_rate_hz / self.broadcast_rate_hz.max(1)).max(1) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_tick_rate_invalid() {
        let config = ServerConfig {
            tick_rate_hz: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn broadcast_faster_than_tick_invalid() {
        let config = ServerConfig {
            broadcast_rate_hz: 120,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn broadcast_every_n_divides_rates() {
        assert_eq!(ServerConfig::default().broadcast_every_n(), 4);
    }
}
