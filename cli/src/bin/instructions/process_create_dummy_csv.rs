use std::collections::HashSet;

use crate::*;

pub fn process_create_dummy_csv(args: &CreateDummyCsvArgs) -> Result<()> {
    let mut rng = rand::thread_rng();
    let base_url = args.base_url.trim_end_matches('/');

    let mut ids = HashSet::with_capacity(args.num_records);
    let mut wtr = Writer::from_path(&args.csv_path)?;
    wtr.write_record(["id", "url"])?;

    while ids.len() < args.num_records {
        let id = random_link_id(&mut rng);
        if ids.insert(id.clone()) {
            let url = format!("{base_url}/{id}");
            wtr.write_record([id.as_str(), url.as_str()])?;
        }
    }

    wtr.flush()?;
    println!("wrote {} links to {}", ids.len(), args.csv_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_csv_loads_as_pool() {
        let args = CreateDummyCsvArgs {
            csv_path: temp_path("mint_links.csv"),
            num_records: 25,
            base_url: "https://poap.xyz/mint/".to_string(),
        };
        process_create_dummy_csv(&args).unwrap();

        let pool = MintPool::new_from_csv(&args.csv_path).unwrap();
        assert_eq!(pool.total_count(), 25);
        let link = &pool.mint_links[0];
        assert_eq!(link.url, format!("https://poap.xyz/mint/{}", link.id));

        remove_if_exists(&args.csv_path);
    }
}
