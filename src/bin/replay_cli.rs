#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
    if let Err(err) = native::run() {
        eprintln!("replay_cli error: {err}");
        std::process::exit(1);
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use shaping_recorder::host::{MemoryHost, MeshAccess};
    use shaping_recorder::persist;
    use shaping_recorder::schedule::{SimulatedClock, TaskKind};
    use shaping_recorder::session::Session;
    use shaping_recorder::settings::{PlaybackMode, RecorderSettings};
    use shaping_recorder::snapshot::MeshData;
    use std::fs::{self, File};
    use std::io::{BufWriter, Write};
    use std::path::{Path, PathBuf};

    /// Upper bound on scheduler steps per replay.
    const MAX_STEPS: usize = 1_000_000;

    const USAGE: &str = r"replay_cli (shaping-recorder)

USAGE:
  replay_cli info <data.json>
  replay_cli replay <data.json> [options]

OPTIONS (replay):
  --object <name>      Object to replay (defaults to the stored display object)
  --settings <path>    Recorder settings as JSON; missing fields use defaults
  --mode <start|active|range>
                       Override the playback mode
  --out-dir <dir>      Write one OBJ per exported frame into this dir
  --overwrite          Overwrite existing output files
  -h, --help           Show this help
";

    pub fn run() -> Result<(), String> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut args = Args::new(args);

        let Some(command) = args.next() else {
            print_usage();
            return Ok(());
        };

        match command.as_str() {
            "info" => cmd_info(&mut args),
            "replay" => cmd_replay(&mut args),
            "-h" | "--help" | "help" => {
                print_usage();
                Ok(())
            }
            other => Err(format!("unknown command `{other}`\n\n{USAGE}")),
        }
    }

    fn print_usage() {
        println!("{USAGE}");
    }

    fn read_state(path: &Path) -> Result<persist::PersistedState, String> {
        let json = fs::read_to_string(path).map_err(|e| format!("read {}: {e}", path.display()))?;
        persist::from_json(&json, |_| true).map_err(|e| format!("parse {}: {e}", path.display()))
    }

    fn cmd_info(args: &mut Args) -> Result<(), String> {
        let path = PathBuf::from(args.next().ok_or("missing data file")?);
        let state = read_state(&path)?;

        println!(
            "display object: {}",
            state.display.as_deref().unwrap_or("<none>")
        );
        for (name, record) in state.ledger.iter() {
            let (v, e, f) = record.initial.mesh.signature();
            println!("{name}: {} steps (initial v={v} e={e} f={f})", record.len());
            for (index, step) in record.steps().iter().enumerate() {
                let (v, e, f) = step.snapshot.mesh.signature();
                let timing = &step.timing;
                let custom = if timing.use_custom {
                    format!(" cam={}s mesh={}s", timing.cam_duration, timing.mesh_duration)
                } else {
                    String::new()
                };
                println!(
                    "  step {:>3}: v={v} e={e} f={f}{custom}{}",
                    index + 1,
                    if timing.marked_edges.is_empty() {
                        String::new()
                    } else {
                        format!(" marked={}", timing.marked_edges.len())
                    }
                );
            }
        }
        Ok(())
    }

    fn cmd_replay(args: &mut Args) -> Result<(), String> {
        let path = PathBuf::from(args.next().ok_or("missing data file")?);

        let mut object: Option<String> = None;
        let mut settings_path: Option<PathBuf> = None;
        let mut mode: Option<PlaybackMode> = None;
        let mut out_dir: Option<PathBuf> = None;
        let mut overwrite = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--object" => object = Some(args.value("--object")?),
                "--settings" => settings_path = Some(PathBuf::from(args.value("--settings")?)),
                "--mode" => mode = Some(parse_mode(&args.value("--mode")?)?),
                "--out-dir" => out_dir = Some(PathBuf::from(args.value("--out-dir")?)),
                "--overwrite" => overwrite = true,
                "-h" | "--help" => {
                    print_usage();
                    return Ok(());
                }
                other => return Err(format!("unknown option `{other}`\n\n{USAGE}")),
            }
        }

        let mut settings = match settings_path {
            Some(path) => {
                let text =
                    fs::read_to_string(&path).map_err(|e| format!("read {}: {e}", path.display()))?;
                serde_json::from_str::<RecorderSettings>(&text)
                    .map_err(|e| format!("parse {}: {e}", path.display()))?
            }
            None => RecorderSettings::default(),
        };
        if let Some(mode) = mode {
            settings.playback_mode = mode;
        }

        let json = fs::read_to_string(&path).map_err(|e| format!("read {}: {e}", path.display()))?;
        let state =
            persist::from_json(&json, |_| true).map_err(|e| format!("parse {}: {e}", path.display()))?;

        // Every recorded object exists in the scene in its last recorded shape.
        let mut host = MemoryHost::new();
        for (name, record) in state.ledger.iter() {
            host.add_mesh(name, record.last_snapshot().mesh.clone());
        }
        host.set_blob(Some(json));

        let mut clock = SimulatedClock::new();
        let mut session = Session::new(settings);
        session.attach(&mut host, &mut clock);

        let target = object
            .or_else(|| session.display_object().map(str::to_owned))
            .ok_or("no object to replay")?;
        if !session.set_display_object(&target) {
            return Err(format!("no recording for `{target}`"));
        }
        if let Some(dir) = out_dir.as_deref() {
            fs::create_dir_all(dir).map_err(|e| format!("create out dir: {e}"))?;
        }

        if !session.play(&mut host, &mut clock, true) {
            return Err(format!("`{target}` has nothing to play"));
        }

        let prefix = session.settings().render_prefix.clone();
        let mut written = 0usize;
        let mut steps = 0usize;
        while session.is_playing() && steps < MAX_STEPS {
            let Some(kind) = clock.step(&mut session, &mut host) else {
                break;
            };
            steps += 1;
            if kind != TaskKind::PlaybackTick {
                continue;
            }
            let frames: Vec<usize> = host.frames()[written..].iter().map(|(i, _)| *i).collect();
            written += frames.len();
            let Some(dir) = out_dir.as_deref() else {
                continue;
            };
            let mesh = host
                .read_mesh(&target)
                .ok_or_else(|| format!("`{target}` disappeared during replay"))?;
            for index in frames {
                let path = dir.join(format!("{prefix}_{index:04}.obj"));
                write_obj_file(&path, &mesh, &target, overwrite)?;
            }
        }

        eprintln!(
            "{target}: {written} frames in {:.3}s",
            clock.now().as_secs_f64()
        );
        if let Some(report) = session.metrics_report() {
            eprintln!("{report:?}");
        }
        session.shutdown(&mut host);
        Ok(())
    }

    fn parse_mode(value: &str) -> Result<PlaybackMode, String> {
        match value.to_ascii_lowercase().as_str() {
            "start" => Ok(PlaybackMode::Start),
            "active" => Ok(PlaybackMode::Active),
            "range" => Ok(PlaybackMode::Range),
            other => Err(format!("unknown playback mode `{other}`")),
        }
    }

    fn write_obj_file(path: &Path, mesh: &MeshData, name: &str, overwrite: bool) -> Result<(), String> {
        if path.exists() && !overwrite {
            return Err(format!(
                "refusing to overwrite existing file {} (use --overwrite)",
                path.display()
            ));
        }

        let file = File::create(path).map_err(|e| format!("create {}: {e}", path.display()))?;
        let mut w = BufWriter::new(file);

        writeln!(w, "# shaping-recorder replay_cli").map_err(|e| format!("write obj: {e}"))?;
        writeln!(w, "o {name}").map_err(|e| format!("write obj: {e}"))?;

        for p in &mesh.vertices {
            writeln!(w, "v {} {} {}", p.x, p.y, p.z).map_err(|e| format!("write obj: {e}"))?;
        }

        for face in &mesh.faces {
            let mut line = String::from("f");
            for &idx in face {
                line.push(' ');
                line.push_str(&(idx + 1).to_string());
            }
            writeln!(w, "{line}").map_err(|e| format!("write obj: {e}"))?;
        }

        // Loose edges only; face boundaries are implied by the faces.
        if mesh.faces.is_empty() {
            for [a, b] in &mesh.edges {
                writeln!(w, "l {} {}", a + 1, b + 1).map_err(|e| format!("write obj: {e}"))?;
            }
        }

        w.flush().map_err(|e| format!("flush obj: {e}"))?;
        Ok(())
    }

    struct Args {
        args: Vec<String>,
        pos: usize,
    }

    impl Args {
        fn new(args: Vec<String>) -> Self {
            Self { args, pos: 0 }
        }

        fn next(&mut self) -> Option<String> {
            let arg = self.args.get(self.pos)?.clone();
            self.pos += 1;
            Some(arg)
        }

        fn value(&mut self, flag: &str) -> Result<String, String> {
            self.next()
                .ok_or_else(|| format!("missing value for {flag}"))
        }
    }
}
