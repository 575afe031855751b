use clap::Args;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::puzzle;

#[derive(Args)]
pub struct BundleArgs {
    #[arg(long, help = "User id")]
    pub user: String,

    #[arg(long, help = "Include answers (signing key, secrets, plaintext)")]
    pub reveal: bool,
}

pub async fn handle(args: BundleArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let bundle = puzzle::derive(args.user.trim())?;

    let data = if args.reveal {
        serde_json::to_value(&bundle)?
    } else {
        bundle.public_view()
    };

    match output_format {
        OutputFormat::Json => output_success(
            &output_format,
            &format!("Puzzle bundle for user hash {}", bundle.user_hash),
            Some(json!({ "bundle": data })),
        ),
        OutputFormat::Text => {
            println!("User hash:        {}", bundle.user_hash);
            println!("Step 1 token:     {}", bundle.jwt_token);
            println!("Step 4 endpoint:  {}", bundle.api_endpoint_path);
            println!("Step 4 token:     {}", bundle.bearer_auth_token);
            println!("Step 5 Caesar:    {}", bundle.cipher.caesar_ciphertext);
            println!("Step 5 XOR (hex): {}", bundle.cipher.xor_ciphertext_hex);
            if args.reveal {
                println!();
                println!("Signing key:      {}", bundle.jwt_signing_key);
                println!("Network clue:     {}", bundle.dev_tools_clue);
                println!("DOM secret:       {}", bundle.dom_secret);
                println!("Console secret:   {}", bundle.console_secret);
                println!("Caesar shift:     {}", bundle.cipher.caesar_shift);
                println!("XOR key:          {}", bundle.cipher.xor_key);
                println!("Plaintext:        {}", bundle.cipher.plaintext);
                println!("SHA-256:          {}", bundle.cipher.plaintext_sha256);
                println!("Verify sentinel:  {}", bundle.cipher.verify_sentinel);
            }
            Ok(())
        }
    }
}
