use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use aribts::desc::DescriptorRegistry;
use aribts::eight::GaijiTable;
use aribts::{table, Sections, Selector};

#[derive(Debug)]
struct AppArgs {
    path: PathBuf,
}

impl AppArgs {
    const HELP: &str = "\
TS内のサービス一覧と現在時刻を表示するコマンド

USAGE:
  sections [PATH]

FLAGS:
  -h, --help    このヘルプを表示する

ARGS:
  <PATH>        表示するTSファイルのパス
";

    pub fn parse() -> Result<AppArgs, Box<dyn std::error::Error>> {
        let mut args = pico_args::Arguments::from_env();

        if args.contains(["-h", "--help"]) {
            println!("{}", Self::HELP);
            std::process::exit(0);
        }

        Ok(AppArgs {
            path: args.free_from_str()?,
        })
    }
}

fn open(path: &Path) -> io::Result<BufReader<File>> {
    Ok(BufReader::with_capacity(188 * 1024, File::open(path)?))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = AppArgs::parse()?;

    env_logger::init();

    // PATから番組構成を表示する
    let mut sections = Sections::new(open(&args.path)?, Selector::with(&[&table::PAT]));
    let Some(section) = sections.next().transpose()? else {
        return Err("PATが見つからない".into());
    };
    let pat = section.instance();

    println!(
        "transport_stream_id: {:#06X}",
        pat.uint("transport_stream_id")?,
    );
    if let Some(pid) = table::pat_network_pid(&pat)? {
        println!("network: {:?}", pid);
    }
    for pid in table::pat_pmt_pids(&pat)? {
        println!("pmt: {:?}", pid);
    }

    // SDTからサービス一覧、TOTから現在時刻を表示する
    let gaiji = GaijiTable::new();
    let registry = DescriptorRegistry::new();
    let mut seen = HashSet::new();
    let mut jst_shown = false;

    for section in Sections::new(open(&args.path)?, Selector::with(&[&table::SDT, &table::TOT])) {
        let section = section?;
        match section.table_id() {
            0x42 | 0x46 => {
                let sdt = section.instance();
                for service in sdt.list("services")?.iter() {
                    let service_id = service.uint("service_id")?;
                    if !seen.insert((section.table_id(), service_id)) {
                        continue;
                    }

                    let mut name = String::new();
                    for descriptor in registry.parse(service.bytes("descriptors")?) {
                        if descriptor.tag() != 0x48 {
                            continue;
                        }
                        let Some(inst) = descriptor.instance() else {
                            continue;
                        };
                        name = inst.text("service_name")?.to_string(&gaiji)?;
                    }

                    println!("service {:#06X}: {}", service_id, name);
                }
            }
            0x73 => {
                if jst_shown {
                    continue;
                }
                let tot = section.instance();
                if let Some(jst) = tot.date_time("JST_time")? {
                    println!("JST: {}", jst);
                    jst_shown = true;
                }
            }
            _ => {}
        }
    }

    Ok(())
}
