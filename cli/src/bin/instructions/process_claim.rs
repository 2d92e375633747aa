use crate::*;

pub fn process_claim(args: &Args, claim_args: &ClaimArgs) -> Result<()> {
    let pool = args.load_pool()?;

    let allow_list = match &claim_args.allow_list_csv {
        Some(path) => AllowList::new_from_csv(path)?,
        None => AllowList::new(default_allow_list()),
    };
    info!("allow-list holds {} wallets", allow_list.len());

    let allocator = MintLinkAllocator::new(pool.unclaimed(), allow_list, args.get_store())?;
    if !allocator.is_whitelisted(&claim_args.wallet) {
        bail!("{} is not on the allow-list", claim_args.wallet);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let outcome = runtime.block_on(allocator.claim(&claim_args.wallet))?;

    match &outcome {
        ClaimOutcome::Assigned(link) => println!("claimed {} ({})", link.id, link.url),
        ClaimOutcome::Existing(link) => println!("already holds {} ({})", link.id, link.url),
        ClaimOutcome::Exhausted => bail!("no links available"),
    }
    Ok(())
}
