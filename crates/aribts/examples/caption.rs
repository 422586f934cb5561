use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use aribts::desc::DescriptorRegistry;
use aribts::eight::GaijiTable;
use aribts::{table, Sections, Selector};

#[derive(Debug)]
struct AppArgs {
    service: Option<u16>,
    gaiji: Option<PathBuf>,
    path: PathBuf,
}

impl AppArgs {
    const HELP: &str = "\
字幕を表示するコマンド

USAGE:
  caption [OPTIONS] [PATH]

FLAGS:
  -h, --help     このヘルプを表示する

OPTIONS:
  --sid [SID]    表示する字幕のサービスID。
                 未指定の場合は最初のサービスが選択される。
  --gaiji [PATH] タブ区切りの外字変換表。
                 未指定の場合は組み込みの変換表が使われる。

ARGS:
  <PATH>         字幕を表示するTSファイルのパス
";

    pub fn parse() -> Result<AppArgs, Box<dyn std::error::Error>> {
        let mut args = pico_args::Arguments::from_env();

        if args.contains(["-h", "--help"]) {
            println!("{}", Self::HELP);
            std::process::exit(0);
        }

        let service = args.opt_value_from_str("--sid")?;
        let gaiji = args.opt_value_from_str("--gaiji")?;

        Ok(AppArgs {
            service,
            gaiji,
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

    let gaiji = match &args.gaiji {
        Some(path) => GaijiTable::parse(&std::fs::read_to_string(path)?)?,
        None => GaijiTable::new(),
    };

    // PATからPMTのPIDを得る
    let mut sections = Sections::new(open(&args.path)?, Selector::with(&[&table::PAT]));
    let Some(section) = sections.next().transpose()? else {
        return Err("PATが見つからない".into());
    };
    let pat = section.instance();

    let mut pmt_pids = Vec::new();
    for entry in pat.list("pids")?.iter() {
        let number = entry.uint("program_number")?;
        if number == 0 {
            continue;
        }
        if args.service.map_or(true, |sid| sid as u64 == number) {
            pmt_pids.extend(aribts::Pid::try_new(entry.uint("program_map_PID")? as u16));
        }
    }
    if pmt_pids.is_empty() {
        return Err("対象のサービスが見つからない".into());
    }

    // PMTから字幕PESのPIDを得る
    let registry = DescriptorRegistry::new();
    let mut selector = Selector::new();
    selector.add_with_pids(&table::PMT, &pmt_pids);

    let mut caption_pid = None;
    for section in Sections::new(open(&args.path)?, selector) {
        let pmt = section?.instance();
        if let Some(pid) = table::pmt_caption_pid(&pmt, &registry)? {
            caption_pid = Some(pid);
            break;
        }
    }
    let Some(caption_pid) = caption_pid else {
        return Err("字幕のストリームが見つからない".into());
    };
    log::info!("caption pid: {:?}", caption_pid);

    // 字幕PESを組み立てて本文を表示する
    let mut selector = Selector::new();
    selector.add_with_pids(&table::SPES, &[caption_pid]);

    for section in Sections::new(open(&args.path)?, selector) {
        let spes = section?.instance();
        let pts = table::spes_pts(&spes)?;

        for unit in spes.list("data_units")?.iter() {
            let Some(body) = unit.case("CProfileString")? else {
                continue;
            };
            let text = body.text("data_unit_data")?.to_string(&gaiji)?;
            if text.is_empty() {
                continue;
            }

            let secs = pts.as_secs();
            println!(
                "{}:{:02}:{:02}.{:03} - {}",
                secs / 3600,
                secs / 60 % 60,
                secs % 60,
                pts.subsec_millis(),
                text,
            );
        }
    }

    Ok(())
}
