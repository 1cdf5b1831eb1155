use benchmark_simple::*;
use jose_simple::prelude::*;

fn main() {
    let bench = Bench::new();

    let options = &Options {
        iterations: 1000,
        warmup_iterations: 100,
        min_samples: 5,
        max_samples: 10,
        max_rsd: 1.0,
        ..Default::default()
    };

    let registry = ExtensionRegistry::new();
    let payload = br#"{"sub":"bench","scope":"read write"}"#.to_vec();

    for alg in [Algorithm::RS256, Algorithm::ES256, Algorithm::EdDSA] {
        let key = JwkBuilder::ephemeral(alg).unwrap().build().unwrap();
        let public = key.well_known();
        let header = JoseBuilder::new(alg).build().unwrap();
        let sign = {
            let (registry, header, key, payload) =
                (registry.clone(), header.clone(), key.clone(), payload.clone());
            move || {
                JwsBuilder::new(&registry)
                    .compact()
                    .next(header.clone(), &key)
                    .sign(&payload)
                    .unwrap()
            }
        };
        let token = sign().to_compact().unwrap();
        let res = bench.run(options, sign);
        println!("{} - sign: {}", alg, res.throughput(1));

        let registry = registry.clone();
        let res = bench.run(options, move || {
            Jws::parse(&token, &registry).unwrap().verify(&public)
        });
        println!("{} - verify: {}", alg, res.throughput(1));
    }

    for (alg, enc) in [
        (Algorithm::A128KW, ContentEncryption::A128CBC_HS256),
        (Algorithm::ECDH_ES, ContentEncryption::A256GCM),
        (Algorithm::RSA_OAEP_256, ContentEncryption::A256GCM),
    ] {
        let key = JwkBuilder::ephemeral(alg).unwrap().build().unwrap();
        let encrypt = {
            let (registry, key, payload) = (registry.clone(), key.clone(), payload.clone());
            move || {
                JweBuilder::new(enc, &registry)
                    .compact()
                    .add_recipient(JoseBuilder::new(alg), &key)
                    .encrypt(&payload)
                    .unwrap()
            }
        };
        let token = encrypt().to_compact().unwrap();
        let res = bench.run(options, encrypt);
        println!("{}+{} - encrypt: {}", alg, enc, res.throughput(1));

        let registry = registry.clone();
        let decryption = DecryptionOptions::default();
        let res = bench.run(options, move || {
            Jwe::parse(&token, &registry)
                .unwrap()
                .decrypt(&key, &decryption)
        });
        println!("{}+{} - decrypt: {}", alg, enc, res.throughput(1));
    }
}
