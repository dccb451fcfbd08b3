/*!
# Kite Command Line Interface

A binary for managing the keys and tokens kites authenticate each other with.

## Usage

```bash
kitecli help [subcommand]
```

## Available subcommands

**keygen**

generates a keypair for a kite (or for kontrol)

**token**

signs a token for a user, addressed to a kite

**verify**

checks a token against a public key and prints its claims

## Example

```bash
kitecli token --key 4a5f...e1 --subject alice --audience /alice/production/math --ttl 3600
```
or
```bash
kitecli verify -p 02ab...9f -t eyJhbGciOi... -a /alice/production/math/1.0.0
```

## Dev

To run from source:

```bash
cargo run --bin kitecli -- keygen
```
*/
use clap::{App, Arg};
use kite_rust::{
    authenticator::audience_matches,
    crypto::publickey_from_hex,
    keypair::Keypair,
    token::{Claims, Token},
};
use std::time::Duration;

#[tokio::main]
pub async fn main() -> kite_rust::Result<()> {
    tracing_subscriber::fmt::init();

    let command_matches = App::new("Kite Command Line Interface")
        .about("Generate keys, sign and inspect kite tokens")
        .subcommand(App::new("keygen").about("prints a new keypair"))
        .subcommand(
            App::new("token")
                .about("signs a token")
                .arg(
                    Arg::with_name("key")
                        .short("k")
                        .long("key")
                        .required(true)
                        .takes_value(true)
                        .help("hex encoded private key of the issuer"),
                )
                .arg(
                    Arg::with_name("subject")
                        .short("s")
                        .long("subject")
                        .required(true)
                        .takes_value(true)
                        .help("username the token proves"),
                )
                .arg(
                    Arg::with_name("audience")
                        .short("a")
                        .long("audience")
                        .required(true)
                        .takes_value(true)
                        .help("prefix of the kites the token is valid for"),
                )
                .arg(
                    Arg::with_name("issuer")
                        .short("i")
                        .long("issuer")
                        .takes_value(true)
                        .help("issuer claim, defaults to kontrol"),
                )
                .arg(
                    Arg::with_name("ttl")
                        .long("ttl")
                        .takes_value(true)
                        .help("lifetime in seconds, defaults to 3600"),
                ),
        )
        .subcommand(
            App::new("verify")
                .about("verifies a token and prints its claims")
                .arg(
                    Arg::with_name("pubkey")
                        .short("p")
                        .long("pubkey")
                        .required(true)
                        .takes_value(true)
                        .help("hex encoded public key the token must be signed with"),
                )
                .arg(
                    Arg::with_name("token")
                        .short("t")
                        .long("token")
                        .required(true)
                        .takes_value(true)
                        .help("the token"),
                )
                .arg(
                    Arg::with_name("audience")
                        .short("a")
                        .long("audience")
                        .takes_value(true)
                        .help("identity of the kite the token is presented to"),
                ),
        )
        .get_matches();

    if command_matches.subcommand_matches("keygen").is_some() {
        let keypair = Keypair::new();
        println!("private key : {}", hex::encode(keypair.privatekey()));
        println!("public key : {}", hex::encode(keypair.publickey()));
        println!("address : {}", keypair.address());
    }
    if let Some(matches) = command_matches.subcommand_matches("token") {
        let keypair = Keypair::from_secret_hex(matches.value_of("key").ok_or("--key is required")?)?;
        let subject = matches.value_of("subject").ok_or("--subject is required")?;
        let audience = matches.value_of("audience").ok_or("--audience is required")?;
        let issuer = matches.value_of("issuer").unwrap_or("kontrol");
        let ttl: u64 = matches.value_of("ttl").unwrap_or("3600").parse()?;

        let claims = Claims::new(issuer, subject, audience, Duration::from_secs(ttl));
        println!("{}", Token::new(claims).sign(&keypair)?);
    }
    if let Some(matches) = command_matches.subcommand_matches("verify") {
        let publickey = publickey_from_hex(matches.value_of("pubkey").ok_or("--pubkey is required")?)?;
        let token = matches.value_of("token").ok_or("--token is required")?;

        let parsed = Token::parse(token, |_| Ok(publickey))?;
        if let Some(kite) = matches.value_of("audience") {
            let audience = parsed.claims.aud.clone().unwrap_or_default();
            if !audience_matches(kite, &audience) {
                return Err(format!("Invalid audience in token: {}", audience).into());
            }
        }
        println!("{}", serde_json::to_string_pretty(&parsed.claims)?);
    }
    Ok(())
}
