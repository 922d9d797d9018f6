use packsmith_lib::platform::{Os, ShellProgram};

use crate::output::print_stat;

pub fn cmd_info(shell: Option<&str>) {
  let os = Os::current();
  let program = ShellProgram::resolve(shell, &os);

  println!("System:");
  print_stat("OS", os.as_str());
  print_stat("Shell", &program.program);
  print_stat("Shell args", &program.args.join(" "));
  print_stat("Dialect", &format!("{:?}", program.kind));
}
