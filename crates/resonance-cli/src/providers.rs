// SPDX-License-Identifier: GPL-3.0-or-later

//! Wires the configured provider credentials into a fused `ProviderClient`,
//! following `resonance-identifier::fusion`'s priority-ordered combination.

use resonance_config::AppConfig;
use resonance_identifier::{CombinedProviderClient, NamedProvider, ProviderClient};
use resonance_providers::{DiscogsProviderClient, MusicBrainzProviderClient};

pub fn build_provider_client(config: &AppConfig) -> CombinedProviderClient {
    let mut providers = Vec::new();

    providers.push(NamedProvider {
        name: "musicbrainz".to_string(),
        client: Box::new(MusicBrainzProviderClient::new(config.providers.acoustid_api_key.clone())) as Box<dyn ProviderClient>,
    });

    if let Some(token) = config.providers.discogs_token.clone() {
        providers.push(NamedProvider {
            name: "discogs".to_string(),
            client: Box::new(DiscogsProviderClient::new(token)) as Box<dyn ProviderClient>,
        });
    }

    CombinedProviderClient::with_priority(providers, config.providers.provider_priority.clone())
}
