use crate::api::handlers::auth::{OAuthClient, Provider};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

// Providers that accept client credentials at startup. Apple, Facebook and
// Twitter exchanges are rejected at the handler level until wired up.
const PROVIDERS: [Provider; 3] = [Provider::Google, Provider::Github, Provider::Microsoft];

pub fn with_args(mut command: Command) -> Command {
    for provider in PROVIDERS {
        let name = provider.as_str();
        let upper = name.to_uppercase();

        let id_arg: &'static str = Box::leak(format!("{name}-client-id").into_boxed_str());
        let id_env: &'static str = Box::leak(format!("PARLATO_{upper}_CLIENT_ID").into_boxed_str());
        let id_help: &'static str =
            Box::leak(format!("OAuth client id for {name} social login").into_boxed_str());

        let secret_arg: &'static str = Box::leak(format!("{name}-client-secret").into_boxed_str());
        let secret_env: &'static str =
            Box::leak(format!("PARLATO_{upper}_CLIENT_SECRET").into_boxed_str());
        let secret_help: &'static str =
            Box::leak(format!("OAuth client secret for {name} social login").into_boxed_str());

        command = command
            .arg(
                Arg::new(id_arg)
                    .long(id_arg)
                    .help(id_help)
                    .env(id_env)
                    .requires(secret_arg),
            )
            .arg(
                Arg::new(secret_arg)
                    .long(secret_arg)
                    .help(secret_help)
                    .env(secret_env)
                    .requires(id_arg),
            );
    }
    command
}

/// Collect the OAuth client credentials present in the CLI matches.
/// Providers without both id and secret are simply absent from the result.
#[must_use]
pub fn parse(matches: &ArgMatches) -> Vec<(Provider, OAuthClient)> {
    PROVIDERS
        .into_iter()
        .filter_map(|provider| {
            let name = provider.as_str();
            let client_id = matches.get_one::<String>(&format!("{name}-client-id"))?;
            let client_secret = matches.get_one::<String>(&format!("{name}-client-secret"))?;
            Some((
                provider,
                OAuthClient {
                    client_id: client_id.clone(),
                    client_secret: SecretString::from(client_secret.clone()),
                },
            ))
        })
        .collect()
}
