use crate::*;

pub fn process_stats(args: &Args) -> Result<()> {
    let pool = args.load_pool()?;

    println!(
        "{} of {} links available",
        pool.available_count(),
        pool.total_count()
    );
    for link in pool.mint_links.iter().filter(|link| link.claimed) {
        if let (Some(wallet), Some(at)) = (&link.claimed_by, &link.claimed_at) {
            println!("{}\t{}\t{}", link.id, wallet, at.to_rfc3339());
        }
    }
    Ok(())
}
