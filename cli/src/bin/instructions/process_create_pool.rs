use crate::*;

pub fn process_create_pool(args: &Args, create_pool_args: &CreatePoolArgs) -> Result<()> {
    let store = args.get_store();

    if let Some(existing) = store.load()? {
        let claimed = existing.total_count() - existing.available_count();
        if claimed > 0 && !create_pool_args.force {
            bail!(
                "{} already holds {} claimed links, pass --force to replace it",
                args.store_path.display(),
                claimed
            );
        }
    }

    let pool = MintPool::new_from_csv(&create_pool_args.csv_path)?;
    store.save(&pool)?;

    println!(
        "created pool of {} links at {}",
        pool.total_count(),
        args.store_path.display()
    );
    Ok(())
}
