use crate::*;

pub fn process_reset(args: &Args) -> Result<()> {
    let pool = args.load_pool()?;
    let claimed = pool.total_count() - pool.available_count();

    let allocator = MintLinkAllocator::new(pool.unclaimed(), AllowList::default(), args.get_store())?;
    allocator.reset()?;

    println!(
        "released {} claimed links, {} available",
        claimed,
        allocator.available_count()
    );
    Ok(())
}
