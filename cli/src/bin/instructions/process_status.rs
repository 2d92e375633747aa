use crate::*;

pub fn process_status(args: &Args, status_args: &StatusArgs) -> Result<()> {
    let pool = args.load_pool()?;

    match pool.assigned_link(&status_args.wallet) {
        Some(link) => println!("{} holds {} ({})", status_args.wallet, link.id, link.url),
        None => println!("{} has not claimed a link", status_args.wallet),
    }
    Ok(())
}
